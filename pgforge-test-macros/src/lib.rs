//! The `for_all_runtimes` attribute macro: turns a test body that refers to
//! a free `runtime` binding into one that runs once per runtime
//! `pgforge_test::discover_runtimes` finds on this machine, optionally
//! restricted to a minimum PostgreSQL version.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{parse_macro_input, Ident, ItemFn, LitStr, Token};

use pgforge_core::version::PartialVersion;

/// `#[for_all_runtimes]` or `#[for_all_runtimes(min = "9.4")]`, stacked
/// above `#[test]`:
///
/// ```ignore
/// #[for_all_runtimes(min = "9.4")]
/// #[test]
/// fn cluster_starts_up() -> TestResult {
///     let environment = build_environment(&runtime)?;
///     // ...
///     Ok(())
/// }
/// ```
///
/// `runtime` is bound to an owned `pgforge::runtime::Runtime` for each
/// runtime this machine can provide; the function's body runs once per
/// runtime, stopping at the first one that returns `Err`.
#[proc_macro_attribute]
pub fn for_all_runtimes(attr: TokenStream, item: TokenStream) -> TokenStream {
    let min_version = match syn::parse::<Args>(attr) {
        Ok(args) => args.min,
        Err(err) => return err.to_compile_error().into(),
    };

    let item_fn = parse_macro_input!(item as ItemFn);

    if item_fn.sig.asyncness.is_some() {
        return syn::Error::new_spanned(
            &item_fn.sig.fn_token,
            "for_all_runtimes wraps a synchronous test function",
        )
        .to_compile_error()
        .into();
    }
    if !item_fn.sig.inputs.is_empty() {
        return syn::Error::new_spanned(
            &item_fn.sig.inputs,
            "for_all_runtimes injects `runtime` itself; the function must take no arguments",
        )
        .to_compile_error()
        .into();
    }

    let ItemFn { attrs, vis, sig, block, .. } = item_fn;
    let name = &sig.ident;
    let output = &sig.output;

    let min_check = min_version.map(|min| {
        let bound = partial_version_tokens(min);
        quote! {
            if !(::pgforge::version::PartialVersion::from(runtime.version) >= #bound) {
                continue;
            }
        }
    });

    let expanded = quote! {
        #(#attrs)*
        #vis fn #name() #output {
            fn body(runtime: ::pgforge::runtime::Runtime) #output #block

            let runtimes = ::pgforge_test::discover_runtimes();
            if runtimes.is_empty() {
                ::log::warn!("no PostgreSQL runtimes discovered; skipping {}", stringify!(#name));
                return Ok(());
            }
            for runtime in runtimes {
                #min_check
                body(runtime)?;
            }
            Ok(())
        }
    };

    expanded.into()
}

/// Parsed attribute arguments: currently just an optional `min = "9.4"`.
struct Args {
    min: Option<PartialVersion>,
}

impl Parse for Args {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.is_empty() {
            return Ok(Self { min: None });
        }
        let key: Ident = input.parse()?;
        if key != "min" {
            return Err(syn::Error::new_spanned(key, "expected `min`"));
        }
        input.parse::<Token![=]>()?;
        let value: LitStr = input.parse()?;
        let min = value
            .value()
            .parse::<PartialVersion>()
            .map_err(|err| syn::Error::new_spanned(&value, format!("invalid version: {err}")))?;
        Ok(Self { min: Some(min) })
    }
}

/// Re-construct a [`PartialVersion`] as the tokens of the matching
/// `pgforge::version::PartialVersion` variant, so the generated code
/// doesn't need to re-parse the `min = "..."` string at runtime.
fn partial_version_tokens(version: PartialVersion) -> TokenStream2 {
    match version {
        PartialVersion::Mmp(a, b, c) => quote! { ::pgforge::version::PartialVersion::Mmp(#a, #b, #c) },
        PartialVersion::Mm(a, b) => quote! { ::pgforge::version::PartialVersion::Mm(#a, #b) },
        PartialVersion::M(a) => quote! { ::pgforge::version::PartialVersion::M(#a) },
        PartialVersion::Post10m(a) => quote! { ::pgforge::version::PartialVersion::Post10m(#a) },
    }
}
