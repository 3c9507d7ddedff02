use crate::repository::expand_repository;
use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput, Error};

mod repository;

/// Derives `faststack::orm::Repository` for a struct whose first declared field carries the
/// managed entity as its first generic type argument, e.g. `SqlRepository<User>`. Also derives
/// `Deref` to that field, so the repository exposes its operations.
#[proc_macro_derive(Repository)]
pub fn generate_repository(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_repository(&input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}
