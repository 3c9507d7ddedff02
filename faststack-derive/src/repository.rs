use proc_macro2::{Span, TokenStream};
use quote::{quote, ToTokens};
use syn::spanned::Spanned;
use syn::{
    Data, DataStruct, DeriveInput, Error, Fields, GenericArgument, Index, PathArguments, Result,
    Type, TypePath,
};

/// Returns the first generic type argument of given type, if any.
pub fn resolve_generic_type(ty: &Type) -> Option<&Type> {
    if let Type::Path(TypePath { path, .. }) = ty {
        path.segments
            .last()
            .and_then(|segment| match &segment.arguments {
                PathArguments::AngleBracketed(arguments) => {
                    arguments.args.iter().find_map(|argument| match argument {
                        GenericArgument::Type(ty) => Some(ty),
                        _ => None,
                    })
                }
                _ => None,
            })
    } else {
        None
    }
}

fn introspection_error(input: &DeriveInput, span: Span) -> Error {
    Error::new(
        span,
        format!("Unable to introspect model for repository {}", input.ident),
    )
}

fn first_declared_field(input: &DeriveInput) -> Result<(TokenStream, &Type)> {
    let Data::Struct(DataStruct { fields, .. }) = &input.data else {
        return Err(Error::new(
            input.span(),
            "Only structs can be marked as a repository!",
        ));
    };

    match fields {
        Fields::Named(fields) => fields
            .named
            .first()
            .and_then(|field| field.ident.as_ref().map(|ident| (ident.to_token_stream(), &field.ty))),
        Fields::Unnamed(fields) => fields
            .unnamed
            .first()
            .map(|field| (Index::from(0).to_token_stream(), &field.ty)),
        Fields::Unit => None,
    }
    .ok_or_else(|| introspection_error(input, input.ident.span()))
}

pub fn expand_repository(input: &DeriveInput) -> Result<TokenStream> {
    let ident = &input.ident;
    let (field, field_ty) = first_declared_field(input)?;
    let model = resolve_generic_type(field_ty)
        .ok_or_else(|| introspection_error(input, field_ty.span()))?;

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::faststack::orm::Repository for #ident #ty_generics #where_clause {
            type Model = #model;
        }

        #[automatically_derived]
        impl #impl_generics ::std::ops::Deref for #ident #ty_generics #where_clause {
            type Target = #field_ty;

            fn deref(&self) -> &Self::Target {
                &self.#field
            }
        }
    })
}
