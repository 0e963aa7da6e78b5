//! Implementation of the `#[derive(Record)]` macro.
//!
//! This macro generates an implementation of the `openquery::Record` trait
//! and field name constants.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{spanned::Spanned, Data, DeriveInput, Error, Fields, Result};

use super::attrs::parse_record_attrs;

/// Main implementation of the Record derive macro.
pub fn record_derive_impl(input: DeriveInput) -> Result<TokenStream> {
    let struct_name = &input.ident;
    let record_name = struct_name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    // Ensure we have a struct with named fields
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(Error::new(
                    input.span(),
                    "Record can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(Error::new(
                input.span(),
                "Record can only be derived for structs",
            ))
        }
    };

    let mut field_constants: Vec<TokenStream> = Vec::new();
    let mut builder_calls: Vec<TokenStream> = Vec::new();
    let mut value_matches: Vec<TokenStream> = Vec::new();
    let mut related_matches: Vec<TokenStream> = Vec::new();
    let mut set_matches: Vec<TokenStream> = Vec::new();
    let mut key_span = None;
    let mut version_span = None;

    for field in fields.iter() {
        let field_name = field
            .ident
            .as_ref()
            .ok_or_else(|| Error::new(field.span(), "expected named field"))?;
        let ty = &field.ty;

        let attrs = parse_record_attrs(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        if attrs.key && key_span.replace(field.span()).is_some() {
            return Err(Error::new(field.span(), "only one field can be #[record(key)]"));
        }
        if attrs.version && version_span.replace(field.span()).is_some() {
            return Err(Error::new(
                field.span(),
                "only one field can be #[record(version)]",
            ));
        }

        let query_name = attrs
            .rename
            .unwrap_or_else(|| field_name.to_string().trim_start_matches("r#").to_string());
        let const_name = format_ident!("{}", to_screaming_snake_case(&query_name));

        field_constants.push(quote! {
            /// Field name constant for type-safe queries.
            pub const #const_name: &'static str = #query_name;
        });

        if attrs.relation {
            builder_calls.push(quote! { .relation::<#ty>(#query_name) });
            related_matches.push(quote! {
                #query_name => ::openquery::RelationField::related(&self.#field_name),
            });
            continue;
        }

        let method = if attrs.key {
            quote! { key }
        } else if attrs.version {
            quote! { version }
        } else {
            quote! { scalar }
        };
        builder_calls.push(quote! { .#method::<#ty>(#query_name) });
        value_matches.push(quote! {
            #query_name => ::openquery::Scalar::as_value(&self.#field_name),
        });
        set_matches.push(quote! {
            #query_name => {
                self.#field_name = ::openquery::Scalar::from_literal(value)?;
                ::core::result::Result::Ok(())
            }
        });
    }

    let expanded = quote! {
        impl #impl_generics #struct_name #ty_generics #where_clause {
            #(#field_constants)*
        }

        impl #impl_generics ::openquery::Record for #struct_name #ty_generics #where_clause {
            fn metadata() -> &'static ::openquery::RecordMetadata {
                ::openquery::metadata::cached::<Self>(|| {
                    ::openquery::RecordMetadata::builder(#record_name)
                        #(#builder_calls)*
                        .build()
                })
            }

            fn record_metadata(&self) -> &'static ::openquery::RecordMetadata {
                <Self as ::openquery::Record>::metadata()
            }

            fn field_value(&self, field: &str) -> ::openquery::Value<'_> {
                match field {
                    #(#value_matches)*
                    _ => ::openquery::Value::Null,
                }
            }

            fn related(&self, relation: &str) -> ::openquery::Related<'_> {
                match relation {
                    #(#related_matches)*
                    _ => ::openquery::Related::Unknown,
                }
            }

            #[allow(unused_variables)]
            fn set_field(
                &mut self,
                field: &str,
                value: ::openquery::Literal,
            ) -> ::openquery::Result<()> {
                match field {
                    #(#set_matches)*
                    _ => ::core::result::Result::Err(::openquery::QueryError::unknown_field(field)),
                }
            }
        }
    };

    Ok(expanded)
}

/// Convert a string to SCREAMING_SNAKE_CASE.
fn to_screaming_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let mut prev_was_lower = false;

    for c in s.chars() {
        if c.is_uppercase() {
            if prev_was_lower {
                result.push('_');
            }
            result.push(c);
            prev_was_lower = false;
        } else if c == '_' || c == '-' {
            result.push('_');
            prev_was_lower = false;
        } else {
            result.push(c.to_ascii_uppercase());
            prev_was_lower = true;
        }
    }

    result
}
