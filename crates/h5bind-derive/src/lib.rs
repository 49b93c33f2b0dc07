//! Proc macro for deriving compound datatype reflection.
//!
//! Provides `#[derive(H5Type)]`, which implements `h5bind::types::H5Type` for a
//! struct by reflecting every field recursively. Field offsets and the total
//! size come from the compiler, so the descriptor matches the in-memory
//! layout whatever `repr` the struct uses.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, quote_spanned};
use syn::spanned::Spanned;
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, LitStr, Member};

/// Derive macro implementing `H5Type` for structs with named or tuple fields.
///
/// Each field type must itself implement `H5Type`; a field that does not is
/// reported at the field's span. A field can be stored under another member
/// name with `#[h5(rename = "name")]`. Tuple fields are named by position.
///
/// Enums, unions, unit structs and structs without fields are rejected.
#[proc_macro_derive(H5Type, attributes(h5))]
pub fn derive_h5type(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match impl_h5type(&input) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn impl_h5type(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named.named.iter().collect::<Vec<_>>(),
            Fields::Unnamed(unnamed) => unnamed.unnamed.iter().collect::<Vec<_>>(),
            Fields::Unit => {
                return Err(syn::Error::new_spanned(
                    name,
                    "H5Type cannot be derived for unit structs",
                ));
            }
        },
        Data::Enum(_) => {
            return Err(syn::Error::new_spanned(
                name,
                "H5Type cannot be derived for enums",
            ));
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                name,
                "H5Type cannot be derived for unions",
            ));
        }
    };
    if fields.is_empty() {
        return Err(syn::Error::new_spanned(
            name,
            "H5Type cannot be derived for structs without fields",
        ));
    }

    let mut field_exprs = Vec::with_capacity(fields.len());
    let mut bounds = Vec::with_capacity(fields.len());
    for (index, field) in fields.iter().enumerate() {
        let member = match &field.ident {
            Some(ident) => Member::Named(ident.clone()),
            None => Member::Unnamed(index.into()),
        };
        let stored = match rename(field)? {
            Some(name) => name,
            None => match &member {
                Member::Named(ident) => ident.to_string(),
                Member::Unnamed(idx) => idx.index.to_string(),
            },
        };
        let ty = &field.ty;
        field_exprs.push(quote_spanned! {ty.span()=>
            ::h5bind::types::CompoundField::new(
                #stored,
                <#ty as ::h5bind::types::H5Type>::type_descriptor(),
                ::core::mem::offset_of!(Self, #member),
            )
        });
        bounds.push(quote_spanned! {ty.span()=> #ty: ::h5bind::types::H5Type });
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    // Concrete field types are checked by the trait calls in the body.
    let where_clause = if input.generics.params.is_empty() {
        quote! { #where_clause }
    } else {
        let existing = where_clause.into_iter().flat_map(|w| w.predicates.iter());
        quote! { where #(#existing,)* #(#bounds,)* }
    };
    let expanded = quote! {
        unsafe impl #impl_generics ::h5bind::types::H5Type for #name #ty_generics #where_clause {
            fn type_descriptor() -> ::h5bind::types::TypeDescriptor {
                ::h5bind::types::TypeDescriptor::Compound(::h5bind::types::CompoundType {
                    fields: ::std::vec![#(#field_exprs),*],
                    size: ::core::mem::size_of::<Self>(),
                })
            }
        }
    };

    Ok(expanded)
}

/// Reads `#[h5(rename = "...")]` off a field.
fn rename(field: &Field) -> syn::Result<Option<String>> {
    let mut renamed = None;
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("h5")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().is_empty() {
                    return Err(meta.error("member name cannot be empty"));
                }
                renamed = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported h5 attribute, expected `rename`"))
            }
        })?;
    }
    Ok(renamed)
}
