//! Expansion of one `#[pipes]` item: trigger removal, per-function checks,
//! chain rewriting and helper injection.

use proc_macro2::{Ident, TokenStream, TokenTree};
use quote::quote;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::visit_mut::{self, VisitMut};
use syn::*;

use crate::chain::ChainRewriter;
use crate::config::{PipeConfig, RewriteContext};
use crate::error;
use crate::helpers::Helper;
use crate::placeholder::pattern_binds;

const TRIGGER: &str = "pipes";

/// Rewrites every function reachable from `item` and removes every trigger
/// attribute from it.
pub fn expand(ctx: RewriteContext, mut item: Item) -> Result<Item> {
    let attrs = match &mut item {
        Item::Fn(item_fn) => &mut item_fn.attrs,
        Item::Impl(item_impl) => &mut item_impl.attrs,
        Item::Trait(item_trait) => &mut item_trait.attrs,
        Item::Mod(item_mod) if item_mod.content.is_some() => &mut item_mod.attrs,
        other => {
            return Err(Error::new(
                other.span(),
                "#[pipes] applies to a function, an impl block, a trait or an inline module",
            ))
        },
    };
    // Repeated triggers on the annotated item itself are redundant
    attrs.retain(|attr| !is_trigger(attr));

    let mut loader = Loader::new(ctx);
    loader.visit_item_mut(&mut item);
    loader.finish().map(|()| item)
}

fn is_trigger(attr: &Attribute) -> bool {
    matches!(attr.style, AttrStyle::Outer)
        && attr
            .path()
            .segments
            .last()
            .map_or(false, |segment| segment.ident == TRIGGER)
}

fn trigger_context(attr: &Attribute) -> Result<RewriteContext> {
    match &attr.meta {
        Meta::Path(_) => Ok(RewriteContext::default()),
        Meta::List(list) => RewriteContext::new(list.parse_args::<PipeConfig>()?),
        Meta::NameValue(meta) => Err(error::configuration(
            meta.span(),
            "expected `#[pipes]` or `#[pipes(option = value, ...)]`",
        )),
    }
}

struct Loader {
    root:   RewriteContext,
    /// Contexts of nested items carrying their own trigger, innermost last.
    scopes: Vec<RewriteContext>,
    errors: Option<Error>,
}

impl Loader {
    fn new(root: RewriteContext) -> Self {
        Self {
            root,
            scopes: Vec::new(),
            errors: None,
        }
    }

    fn ctx(&self) -> &RewriteContext {
        self.scopes.last().unwrap_or(&self.root)
    }

    /// Strips triggers from `attrs`. The first one opens a scope with its
    /// own options; returns whether a scope was opened.
    fn enter(&mut self, attrs: &mut Vec<Attribute>) -> bool {
        let mut own = None;
        let mut errors = None;
        attrs.retain(|attr| {
            if !is_trigger(attr) {
                return true;
            }
            if own.is_none() {
                match trigger_context(attr) {
                    Ok(ctx) => own = Some(ctx),
                    Err(err) => error::push(&mut errors, err),
                }
            }
            false
        });
        if let Some(err) = errors {
            error::push(&mut self.errors, err);
        }
        match own {
            Some(ctx) => {
                self.scopes.push(ctx);
                true
            },
            None => false,
        }
    }

    fn leave(&mut self, scoped: bool) {
        if scoped {
            self.scopes.pop();
        }
    }

    fn rewrite_fn(&mut self, sig: &Signature, block: &mut Block) {
        let ctx = self.ctx().clone();
        if let Err(err) = check_collisions(&ctx, sig, block) {
            error::push(&mut self.errors, err);
            return;
        }

        let mut rewriter = ChainRewriter::new(&ctx);
        rewriter.visit_block_mut(block);
        let rewritten = rewriter.finish();

        // Functions nested in the body are expanded on their own
        visit_mut::visit_block_mut(self, block);

        match rewritten {
            Ok(helpers) => helpers.inject(block, &ctx),
            Err(err) => error::push(&mut self.errors, err),
        }
    }

    fn finish(self) -> Result<()> {
        match self.errors {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl VisitMut for Loader {
    fn visit_item_fn_mut(&mut self, item: &mut ItemFn) {
        let scoped = self.enter(&mut item.attrs);
        self.rewrite_fn(&item.sig, &mut item.block);
        self.leave(scoped);
    }

    fn visit_impl_item_fn_mut(&mut self, item: &mut ImplItemFn) {
        let scoped = self.enter(&mut item.attrs);
        self.rewrite_fn(&item.sig, &mut item.block);
        self.leave(scoped);
    }

    fn visit_trait_item_fn_mut(&mut self, item: &mut TraitItemFn) {
        let scoped = self.enter(&mut item.attrs);
        if let Some(block) = &mut item.default {
            self.rewrite_fn(&item.sig, block);
        }
        self.leave(scoped);
    }

    fn visit_item_impl_mut(&mut self, item: &mut ItemImpl) {
        let scoped = self.enter(&mut item.attrs);
        visit_mut::visit_item_impl_mut(self, item);
        self.leave(scoped);
    }

    fn visit_item_trait_mut(&mut self, item: &mut ItemTrait) {
        let scoped = self.enter(&mut item.attrs);
        visit_mut::visit_item_trait_mut(self, item);
        self.leave(scoped);
    }

    fn visit_item_mod_mut(&mut self, item: &mut ItemMod) {
        let scoped = self.enter(&mut item.attrs);
        visit_mut::visit_item_mod_mut(self, item);
        self.leave(scoped);
    }
}

/// Names the generated code introduces must not already be used by the
/// function, and an identifier placeholder must not be a variable of it.
fn check_collisions(ctx: &RewriteContext, sig: &Signature, block: &Block) -> Result<()> {
    let var = ctx.substitution_var.to_string();
    let reserved: Vec<&str> = std::iter::once(var.as_str())
        .chain(Helper::ALL.iter().map(|helper| helper.name()))
        .collect();
    if let Some(ident) = find_ident(quote!(#sig #block), &reserved) {
        return Err(error::configuration(
            ident.span(),
            format!("`{ident}` is reserved for the rewritten code of this function"),
        ));
    }

    let Some(name) = ctx.placeholder.ident() else {
        return Ok(());
    };
    let param = sig.inputs.iter().find_map(|input| match input {
        FnArg::Typed(typed) if pattern_binds(&typed.pat, name) => Some(typed.pat.span()),
        _ => None,
    });
    let mut bindings = LetBindings { name, found: None };
    bindings.visit_block(block);
    match param.or(bindings.found) {
        Some(span) => Err(error::configuration(
            span,
            format!("placeholder `{name}` is also a variable of this function"),
        )),
        None => Ok(()),
    }
}

fn find_ident(tokens: TokenStream, names: &[&str]) -> Option<Ident> {
    tokens.into_iter().find_map(|tree| match tree {
        TokenTree::Ident(ident) if names.iter().any(|name| ident == *name) => Some(ident),
        TokenTree::Group(group) => find_ident(group.stream(), names),
        _ => None,
    })
}

/// First `let` binding of a name. Closure parameters may shadow it.
struct LetBindings<'a> {
    name:  &'a Ident,
    found: Option<proc_macro2::Span>,
}

impl<'ast> Visit<'ast> for LetBindings<'_> {
    fn visit_local(&mut self, local: &'ast Local) {
        if self.found.is_none() && pattern_binds(&local.pat, self.name) {
            self.found = Some(local.pat.span());
        }
        visit::visit_local(self, local);
    }

    fn visit_item(&mut self, _: &'ast Item) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quote::ToTokens;

    fn expand_default(item: Item) -> Result<Item> {
        expand(RewriteContext::default(), item)
    }

    fn messages(err: Error) -> Vec<String> {
        err.into_iter().map(|err| err.to_string()).collect()
    }

    #[test]
    fn rewrites_function_body() {
        let item = expand_default(parse_quote! {
            fn run() -> usize {
                &vec![1, 2, 3] >> Vec::len
            }
        })
        .unwrap();
        let expected: Item = parse_quote! {
            fn run() -> usize {
                Vec::len(&vec![1, 2, 3])
            }
        };
        assert_eq!(
            item.to_token_stream().to_string(),
            expected.to_token_stream().to_string()
        );
    }

    #[test]
    fn strips_every_trigger() {
        let item = expand_default(parse_quote! {
            #[pipes]
            #[inline]
            impl Counter {
                #[pipes::pipes(placeholder = it)]
                fn next(&self) -> u32 { self.count >> it + 1 }
            }
        })
        .unwrap();
        let rendered = item.to_token_stream().to_string();
        assert!(!rendered.contains("pipes"), "{rendered}");
        assert!(rendered.contains("inline"));
        assert!(rendered.contains("self . count + 1"), "{rendered}");
    }

    #[test]
    fn nested_trigger_scopes_its_own_options() {
        let item = expand_default(parse_quote! {
            mod ops {
                fn plain() -> i32 { 1 >> _ + 1 }
                #[pipes(operator = |)]
                fn custom() -> i32 { 1 | _ + 1 }
                fn after() -> i32 { 2 >> double }
            }
        })
        .unwrap();
        let Item::Mod(module) = item else {
            panic!("expected a module");
        };
        let bodies: Vec<String> = module
            .content
            .unwrap()
            .1
            .iter()
            .map(|item| match item {
                Item::Fn(item_fn) => item_fn.block.to_token_stream().to_string(),
                other => panic!("unexpected item {}", other.to_token_stream()),
            })
            .collect();
        assert_eq!(bodies[0], quote!({ 1 + 1 }).to_string());
        assert_eq!(bodies[1], quote!({ 1 + 1 }).to_string());
        assert_eq!(bodies[2], quote!({ double(2) }).to_string());
    }

    #[test]
    fn trait_default_bodies() {
        let item = expand_default(parse_quote! {
            trait Describe {
                fn name(&self) -> String;
                fn describe(&self) -> String { self.name() >> format!("<{}>", _) }
            }
        })
        .unwrap();
        let rendered = item.to_token_stream().to_string();
        assert!(rendered.contains("self . name ()"), "{rendered}");
        assert!(!rendered.contains("__pipe_value"), "{rendered}");
    }

    #[test]
    fn injects_helpers_per_function() {
        let item = expand_default(parse_quote! {
            fn outer() -> i32 {
                fn inner() -> i32 { 1 >> (|x| x + 1) }
                2 >> tap(drop)
            }
        })
        .unwrap();
        let Item::Fn(outer) = item else {
            panic!("expected a function");
        };
        let names: Vec<String> = outer
            .block
            .stmts
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Item(Item::Fn(item_fn)) => Some(item_fn.sig.ident.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["__pipes_tap", "inner"]);
        let inner = outer.block.stmts[1].to_token_stream().to_string();
        assert!(inner.contains("fn __pipes_apply"));
    }

    #[test]
    fn rejects_reserved_names() {
        let err = expand_default(parse_quote! {
            fn run(__pipe_value: i32) -> i32 { __pipe_value >> double }
        })
        .unwrap_err();
        assert_eq!(
            messages(err),
            vec![
                "invalid #[pipes] configuration: `__pipe_value` is reserved for the rewritten code of this function"
                    .to_string()
            ]
        );
    }

    #[test]
    fn rejects_bound_placeholder() {
        let ctx = RewriteContext::new(parse_quote!(placeholder = it)).unwrap();
        let param = expand(ctx.clone(), parse_quote!(fn run(it: i32) -> i32 { it >> double }));
        let local = expand(
            ctx.clone(),
            parse_quote!(fn run() -> i32 { let it = 1; it >> double }),
        );
        for result in [param, local] {
            assert_eq!(
                messages(result.unwrap_err()),
                vec!["invalid #[pipes] configuration: placeholder `it` is also a variable of this function".to_string()]
            );
        }
        let shadowing = expand(ctx, parse_quote!(fn run() -> i32 { 1 >> (|it| it * 2) }));
        assert!(shadowing.is_ok());
    }

    #[test]
    fn reports_errors_of_every_function() {
        let err = expand_default(parse_quote! {
            impl Broken {
                fn first() -> i32 { 1 >> 2 }
                fn second() -> i32 { 1 >> 3 }
            }
        })
        .unwrap_err();
        assert_eq!(messages(err).len(), 2);
    }

    #[test]
    fn rejects_other_items() {
        let err = expand_default(parse_quote!(struct Plain;)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "#[pipes] applies to a function, an impl block, a trait or an inline module"
        );
        assert!(expand_default(parse_quote!(mod outside;)).is_err());
    }

    #[test]
    fn rejects_name_value_trigger() {
        let err = expand_default(parse_quote! {
            mod m {
                #[pipes = "debug"]
                fn run() {}
            }
        })
        .unwrap_err();
        assert!(err.to_string().starts_with("invalid #[pipes] configuration: expected"));
    }
}
