//! Attribute macro that stands in for the linker-section trick described by
//! the runner: it turns a plain function into a `TestDescriptor` and deposits
//! a reference to it into `partest::TESTS`, a `linkme::distributed_slice`.
//!
//! ```ignore
//! #[partest::test]
//! fn addition_is_commutative() {
//!     partest::mark!();
//!     assert_eq!(2 + 2, 4);
//! }
//! ```

extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, AttributeArgs, Ident, ItemFn, Lit, Meta, NestedMeta,
};

/// Parsed form of the attribute's argument list, e.g.
/// `#[partest::test(exit = 101, timeout = 0.5)]`.
#[derive(Default)]
struct TestArgs {
    exit_status: Option<i32>,
    signal: Option<String>,
    expect_fail: bool,
    timeout: Option<f64>,
    setup: Option<Ident>,
    teardown: Option<Ident>,
    cleanup: Option<Ident>,
    range: Option<(i64, i64)>,
    bench: bool,
}

fn parse_args(args: AttributeArgs) -> TestArgs {
    let mut out = TestArgs::default();
    for arg in args {
        match arg {
            NestedMeta::Meta(Meta::NameValue(nv)) => {
                let key = nv.path.get_ident().map(|i| i.to_string());
                match (key.as_deref(), &nv.lit) {
                    (Some("exit"), Lit::Int(v)) => {
                        out.exit_status = v.base10_parse().ok();
                    }
                    (Some("signal"), Lit::Str(v)) => {
                        out.signal = Some(v.value());
                    }
                    (Some("timeout"), Lit::Float(v)) => {
                        out.timeout = v.base10_parse().ok();
                    }
                    (Some("timeout"), Lit::Int(v)) => {
                        out.timeout = v.base10_parse::<i64>().ok().map(|n| n as f64);
                    }
                    (Some("setup"), Lit::Str(v)) => {
                        out.setup = Some(Ident::new(&v.value(), Span::call_site()));
                    }
                    (Some("teardown"), Lit::Str(v)) => {
                        out.teardown = Some(Ident::new(&v.value(), Span::call_site()));
                    }
                    (Some("cleanup"), Lit::Str(v)) => {
                        out.cleanup = Some(Ident::new(&v.value(), Span::call_site()));
                    }
                    (Some("range"), Lit::Str(v)) => {
                        let s = v.value();
                        if let Some((lo, hi)) = s.split_once("..") {
                            if let (Ok(lo), Ok(hi)) =
                                (lo.trim().parse(), hi.trim().parse())
                            {
                                out.range = Some((lo, hi));
                            }
                        }
                    }
                    _ => {}
                }
            }
            NestedMeta::Meta(Meta::Path(p)) => {
                if p.is_ident("expect_fail") {
                    out.expect_fail = true;
                } else if p.is_ident("bench") {
                    out.bench = true;
                }
            }
            _ => {}
        }
    }
    out
}

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as AttributeArgs);
    let input = parse_macro_input!(item as ItemFn);
    let parsed = parse_args(args);

    let user_fn_name = input.sig.ident.clone();
    let arity = input.sig.inputs.len();
    let wrapper_name = format_ident!("__partest_body_{}", user_fn_name);
    let desc_static = format_ident!(
        "__PARTEST_DESC_{}",
        user_fn_name.to_string().to_uppercase()
    );
    let name_str = user_fn_name.to_string();

    let call = match arity {
        0 => quote! { #user_fn_name() },
        1 => quote! { #user_fn_name(index) },
        _ => quote! { #user_fn_name(index, bench_n) },
    };

    let exit_status = opt_i32(parsed.exit_status);
    let signal = opt_signal(&parsed.signal);
    let expect_fail = parsed.expect_fail;
    let timeout = opt_f64(parsed.timeout);
    let is_ranged = parsed.range.is_some();
    let (range_lo, range_hi) = parsed.range.unwrap_or((0, 0));
    let is_bench = parsed.bench;

    let setup_ptr = match &parsed.setup {
        Some(f) => quote! { Some(#f as partest::descriptor::HookFn) },
        None => quote! { None },
    };
    let teardown_ptr = match &parsed.teardown {
        Some(f) => quote! { Some(#f as partest::descriptor::HookFn) },
        None => quote! { None },
    };
    let cleanup_ptr = match &parsed.cleanup {
        Some(f) => quote! { Some(#f as partest::descriptor::HookFn) },
        None => quote! { None },
    };

    let expanded = quote! {
        #input

        fn #wrapper_name(index: i64, bench_n: u64, _item: *const ::core::ffi::c_void) {
            let _ = (index, bench_n);
            #call
        }

        #[::linkme::distributed_slice(partest::TESTS)]
        static #desc_static: &'static partest::descriptor::TestDescriptor =
            &partest::descriptor::TestDescriptor {
                name: #name_str,
                func_name: ::core::concat!(::core::module_path!(), "::", #name_str),
                body: #wrapper_name,
                setup: #setup_ptr,
                teardown: #teardown_ptr,
                cleanup: #cleanup_ptr,
                expect_exit_status: #exit_status,
                expect_signal: #signal,
                expect_fail: #expect_fail,
                timeout_s: #timeout,
                is_ranged: #is_ranged,
                range_lo: #range_lo,
                range_hi: #range_hi,
                table: None,
                is_bench: #is_bench,
            };
    };

    TokenStream::from(expanded)
}

fn opt_i32(v: Option<i32>) -> proc_macro2::TokenStream {
    match v {
        Some(n) => quote! { Some(#n) },
        None => quote! { None },
    }
}

fn opt_f64(v: Option<f64>) -> proc_macro2::TokenStream {
    match v {
        Some(n) => quote! { Some(#n) },
        None => quote! { None },
    }
}

fn opt_signal(v: &Option<String>) -> proc_macro2::TokenStream {
    match v {
        Some(name) => quote! { Some(partest::signal::name_to_number(#name)) },
        None => quote! { None },
    }
}
