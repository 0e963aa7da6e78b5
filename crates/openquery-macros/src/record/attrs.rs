//! Attribute parsing for the Record derive macro.
//!
//! Parses the `#[record(...)]` field attributes.

use proc_macro2::Span;
use syn::{
    parse::{Parse, ParseStream},
    punctuated::Punctuated,
    spanned::Spanned,
    Attribute, Error, Lit, Meta, Result, Token,
};

/// Field-level attributes from `#[record(...)]`.
#[derive(Debug, Clone)]
pub struct RecordAttr {
    /// Identifier field; never patchable.
    pub key: bool,
    /// Optimistic concurrency token.
    pub version: bool,
    /// Relation container instead of a scalar.
    pub relation: bool,
    /// Leave the field out of the record entirely.
    pub skip: bool,
    /// Custom field name for queries (default: field name).
    pub rename: Option<String>,
    /// The span for error reporting.
    pub span: Span,
}

impl Default for RecordAttr {
    fn default() -> Self {
        RecordAttr {
            key: false,
            version: false,
            relation: false,
            skip: false,
            rename: None,
            span: Span::call_site(),
        }
    }
}

impl Parse for RecordAttr {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut attr = RecordAttr {
            span: input.span(),
            ..RecordAttr::default()
        };

        let content: Punctuated<Meta, Token![,]> = Punctuated::parse_terminated(input)?;

        for meta in content {
            match &meta {
                Meta::Path(p) if p.is_ident("key") => attr.key = true,
                Meta::Path(p) if p.is_ident("version") => attr.version = true,
                Meta::Path(p) if p.is_ident("relation") => attr.relation = true,
                Meta::Path(p) if p.is_ident("skip") => attr.skip = true,

                Meta::NameValue(nv) if nv.path.is_ident("rename") => {
                    if let syn::Expr::Lit(syn::ExprLit {
                        lit: Lit::Str(s), ..
                    }) = &nv.value
                    {
                        attr.rename = Some(s.value());
                    } else {
                        return Err(Error::new(
                            nv.value.span(),
                            "rename must be a string literal",
                        ));
                    }
                }

                _ => {
                    return Err(Error::new(
                        meta.span(),
                        "unknown record attribute. Expected: key, version, relation, skip, or rename = \"...\"",
                    ));
                }
            }
        }

        let roles = [attr.key, attr.version, attr.relation]
            .iter()
            .filter(|set| **set)
            .count();
        if roles > 1 {
            return Err(Error::new(
                attr.span,
                "key, version and relation are mutually exclusive",
            ));
        }

        Ok(attr)
    }
}

/// Extract `#[record(...)]` attributes from a field's attributes.
pub fn parse_record_attrs(attrs: &[Attribute]) -> Result<RecordAttr> {
    for attr in attrs {
        if attr.path().is_ident("record") {
            return attr.parse_args::<RecordAttr>();
        }
    }
    Ok(RecordAttr::default())
}
