//! `#[timeout]` and `#[tokio_timeout_test]` run the test body on a helper
//! thread and fail the test if it has not finished within the limit
//! (60 seconds unless an integer literal is passed to the attribute).

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, ItemFn, LitInt};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Sync,
    Tokio,
}

#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(Flavor::Sync, attr.into(), item.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(Flavor::Tokio, attr.into(), item.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(flavor: Flavor, attr: TokenStream2, item: TokenStream2) -> syn::Result<TokenStream2> {
    let secs = timeout_secs(attr)?;
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = syn::parse2::<ItemFn>(item)?;

    match (flavor, sig.asyncness.is_some()) {
        (Flavor::Sync, true) => {
            return Err(syn::Error::new_spanned(
                &sig.ident,
                "#[timeout] expects a synchronous test; use #[tokio_timeout_test]",
            ))
        }
        (Flavor::Tokio, false) => {
            return Err(syn::Error::new_spanned(
                &sig.ident,
                "#[tokio_timeout_test] expects an async test",
            ))
        }
        _ => {}
    }
    sig.asyncness = None;
    let thread_name = sig.ident.to_string();

    // A leftover #[test] or #[tokio::test] would register the function twice.
    let attrs: Vec<Attribute> = attrs.into_iter().filter(|a| !is_test_marker(a)).collect();

    let body = match flavor {
        Flavor::Sync => quote! { #block },
        Flavor::Tokio => quote! {
            {
                let runtime = ::tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("build tokio runtime for test");
                runtime.block_on(async move #block)
            }
        },
    };

    Ok(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let limit = ::std::time::Duration::from_secs(#secs);
            let (done_tx, done_rx) = ::std::sync::mpsc::channel();
            let worker = ::std::thread::Builder::new()
                .name(::std::string::String::from(#thread_name))
                .spawn(move || {
                    let outcome = ::std::panic::catch_unwind(
                        ::std::panic::AssertUnwindSafe(|| #body),
                    );
                    let _ = done_tx.send(outcome);
                })
                .expect("spawn test thread");
            match done_rx.recv_timeout(limit) {
                Ok(Ok(_)) => {
                    let _ = worker.join();
                }
                Ok(Err(payload)) => ::std::panic::resume_unwind(payload),
                Err(::std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    panic!("test exceeded {}s timeout", #secs)
                }
                Err(::std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("test thread exited without reporting")
                }
            }
        }
    })
}

fn timeout_secs(attr: TokenStream2) -> syn::Result<u64> {
    if attr.is_empty() {
        return Ok(DEFAULT_TIMEOUT_SECS);
    }
    let lit = syn::parse2::<LitInt>(attr)?;
    let secs: u64 = lit.base10_parse()?;
    if secs == 0 {
        return Err(syn::Error::new_spanned(lit, "timeout must be at least one second"));
    }
    Ok(secs)
}

fn is_test_marker(attr: &Attribute) -> bool {
    let names: Vec<String> = attr
        .path()
        .segments
        .iter()
        .map(|segment| segment.ident.to_string())
        .collect();
    matches!(names.as_slice(), [one] if one == "test")
        || matches!(names.as_slice(), [krate, name] if krate == "tokio" && name == "test")
}
