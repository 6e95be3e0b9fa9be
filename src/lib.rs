/*
 *  Salesboard - Discord bot for weekly sales leaderboards from Google Sheets.
 *  Copyright (C) 2025  Manuel de Castro
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */
/*
 * Procedural macros must live in a `proc-macro` library crate, so the bot's binary gets them from
 * here.
 */
extern crate proc_macro;
use proc_macro::TokenStream;
use quote::ToTokens as _;
use syn::spanned::Spanned as _;
use syn::{parse_macro_input, ItemFn};

fn macro_error(error: syn::Error) -> TokenStream {
    darling::Error::from(error).write_errors().into()
}

/**
 * Logs every invocation of a command.
 *
 * The annotated function must be a poise command whose first argument is its `Context`. A call
 * to `crate::utils::log_cmd_usage!` with that context is inserted as the first statement of the
 * function body.
 */
#[proc_macro_attribute]
pub fn log_cmd(_macro_attrs: TokenStream, function: TokenStream) -> TokenStream {
    let mut function = parse_macro_input!(function as ItemFn);

    let Some(first_arg) = function.sig.inputs.first() else {
        return macro_error(syn::Error::new(
            function.sig.span(),
            "[log_cmd] function must have at least one argument",
        ));
    };
    // The context must be a typed argument (i.e. `ctx: Context<'_>`), not `self`:
    let syn::FnArg::Typed(ctx_arg) = first_arg else {
        return macro_error(syn::Error::new(
            first_arg.span(),
            "[log_cmd] `self` argument is not allowed",
        ));
    };
    let syn::Pat::Ident(ident) = &*ctx_arg.pat else {
        return macro_error(syn::Error::new(
            ctx_arg.pat.span(),
            "[log_cmd] expected an identifier",
        ));
    };
    let ctx_ident = ident.ident.clone();

    let log_stmt: syn::Stmt = syn::parse_quote! {
        crate::utils::log_cmd_usage!(#ctx_ident);
    };
    function.block.stmts.insert(0, log_stmt);

    function.into_token_stream().into()
}
