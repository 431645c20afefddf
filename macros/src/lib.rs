use heck::ToSnakeCase;
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Derives `gearbox::options::Named` for a zero-sized marker type, using the
/// type's snake_case name as the symbolic key under which guards, actions,
/// delays and services are registered in a machine's options table.
///
/// ```ignore
/// #[derive(Named)]
/// struct IsAdult;
///
/// options.guard_for::<IsAdult>(std::sync::Arc::new(|ctx, _event, _meta| Ok(ctx["age"].as_i64().unwrap_or(0) >= 18)));
/// ```
#[proc_macro_derive(Named)]
pub fn derive_named(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let ident = input.ident;
    let key = ident.to_string().to_snake_case();

    let expanded = quote! {
        impl ::gearbox::options::Named for #ident {
            fn name() -> &'static str {
                #key
            }
        }
    };

    TokenStream::from(expanded)
}
