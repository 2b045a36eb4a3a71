use proc_macro::TokenStream as TokenStream1;
use proc_macro2::Ident;
use quote::ToTokens;
use syn::{self, parse_quote};

/// This macro is added before an action method of `PlayerSubHand` in the impl block.
/// Use this macro to first check if the sub-hand currently allows the action in
/// the attribute.
///
/// For example, `#[requires_action(Double)]` will make a method first check
/// `self.is_legal(Action::Double)`. If not, the method will return
/// `Err(ActionError::Illegal { .. })` before any card is dealt.
///
/// `Action` and `ActionError` must be in scope where the method is defined, and
/// the method must return a `Result` whose error converts from `ActionError`.
#[proc_macro_attribute]
pub fn requires_action(attr: TokenStream1, item: TokenStream1) -> TokenStream1 {
    let mut ast: syn::ImplItemFn = syn::parse(item).unwrap();
    let action: Ident = syn::parse(attr).expect("requires_action takes one Action variant");
    ast.block.stmts.insert(0, guard_statement(&action));
    ast.into_token_stream().into()
}

fn guard_statement(action: &Ident) -> syn::Stmt {
    parse_quote! {
        if !self.is_legal(Action::#action) {
            return Err(ActionError::Illegal {
                action: Action::#action,
                hand: self.to_string(),
            }
            .into());
        }
    }
}
