//! Finding and replacing free occurrences of the placeholder inside a stage.
//!
//! An occurrence is free unless it sits inside a closure whose parameters
//! bind the placeholder name. Nested items are never entered. Macro bodies
//! are handled as comma separated expressions when they parse that way and
//! as raw tokens otherwise.

use proc_macro2::{Group, Ident, TokenStream, TokenTree};
use quote::ToTokens;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::visit_mut::{self, VisitMut};
use syn::*;

use crate::config::Placeholder;
use crate::utils::ident_expr;

pub type MacroArgs = Punctuated<Expr, Token![,]>;

pub fn macro_args(mac: &Macro) -> Option<MacroArgs> {
    mac.parse_body_with(MacroArgs::parse_terminated).ok()
}

/// `true` when `pat` introduces a binding named `name`.
pub fn pattern_binds(pat: &Pat, name: &Ident) -> bool {
    struct Binder<'a> {
        name:  &'a Ident,
        found: bool,
    }

    impl<'ast> Visit<'ast> for Binder<'_> {
        fn visit_pat_ident(&mut self, pat: &'ast PatIdent) {
            if pat.ident == *self.name {
                self.found = true;
            }
            visit::visit_pat_ident(self, pat);
        }
    }

    let mut binder = Binder { name, found: false };
    binder.visit_pat(pat);
    binder.found
}

fn closure_shadows(closure: &ExprClosure, placeholder: &Placeholder) -> bool {
    match placeholder.ident() {
        Some(name) => closure.inputs.iter().any(|pat| pattern_binds(pat, name)),
        None => false,
    }
}

struct PlaceholderScan<'a> {
    placeholder:      &'a Placeholder,
    descend_closures: bool,
    count:            usize,
}

impl<'ast> Visit<'ast> for PlaceholderScan<'_> {
    fn visit_expr(&mut self, expr: &'ast Expr) {
        if self.placeholder.matches_expr(expr) {
            self.count += 1;
            return;
        }
        visit::visit_expr(self, expr);
    }

    fn visit_expr_closure(&mut self, closure: &'ast ExprClosure) {
        if self.descend_closures && !closure_shadows(closure, self.placeholder) {
            visit::visit_expr_closure(self, closure);
        }
    }

    fn visit_item(&mut self, _: &'ast Item) {}

    fn visit_macro(&mut self, mac: &'ast Macro) {
        self.count += match macro_args(mac) {
            Some(args) => {
                let mut inner = PlaceholderScan {
                    placeholder:      self.placeholder,
                    descend_closures: self.descend_closures,
                    count:            0,
                };
                args.iter().for_each(|arg| inner.visit_expr(arg));
                inner.count
            },
            None => count_tokens(mac.tokens.clone(), self.placeholder),
        };
    }
}

fn count_tokens(tokens: TokenStream, placeholder: &Placeholder) -> usize {
    tokens
        .into_iter()
        .map(|tree| match tree {
            TokenTree::Ident(ident) if placeholder.matches_ident(&ident) => 1,
            TokenTree::Group(group) => count_tokens(group.stream(), placeholder),
            _ => 0,
        })
        .sum()
}

/// Free occurrences in `expr`, skipping closure bodies entirely.
///
/// This is the detection rule for placeholder shortcuts: `f(|x| x + _)`
/// does not use the placeholder at the stage level.
pub fn count_outside_closures(expr: &Expr, placeholder: &Placeholder) -> usize {
    let mut scan = PlaceholderScan { placeholder, descend_closures: false, count: 0 };
    scan.visit_expr(expr);
    scan.count
}

/// Free occurrences in `expr`, closure bodies included unless shadowed.
pub fn count_free(expr: &Expr, placeholder: &Placeholder) -> usize {
    let mut scan = PlaceholderScan { placeholder, descend_closures: true, count: 0 };
    // A closure stage is scanned through its own parameters too
    if let Expr::Closure(closure) = expr {
        if closure_shadows(closure, placeholder) {
            return 0;
        }
        scan.visit_expr(&closure.body);
        return scan.count;
    }
    scan.visit_expr(expr);
    scan.count
}

/// Whether every free occurrence would run each time the stage runs:
/// closures, branches, loops and the right side of `&&` / `||` defer it.
struct EvaluationScan<'a> {
    placeholder: &'a Placeholder,
    deferred:    usize,
    eager:       bool,
}

impl<'ast> Visit<'ast> for EvaluationScan<'_> {
    fn visit_expr(&mut self, expr: &'ast Expr) {
        if self.placeholder.matches_expr(expr) {
            self.eager &= self.deferred == 0;
            return;
        }
        match expr {
            Expr::Closure(closure) if closure_shadows(closure, self.placeholder) => {},
            Expr::Closure(_)
            | Expr::If(_)
            | Expr::Match(_)
            | Expr::Loop(_)
            | Expr::While(_)
            | Expr::ForLoop(_)
            | Expr::Async(_) => {
                self.deferred += 1;
                visit::visit_expr(self, expr);
                self.deferred -= 1;
            },
            Expr::Binary(binary) if matches!(binary.op, BinOp::And(_) | BinOp::Or(_)) => {
                self.visit_expr(&binary.left);
                self.deferred += 1;
                self.visit_expr(&binary.right);
                self.deferred -= 1;
            },
            _ => visit::visit_expr(self, expr),
        }
    }

    fn visit_item(&mut self, _: &'ast Item) {}

    fn visit_macro(&mut self, mac: &'ast Macro) {
        match macro_args(mac) {
            Some(args) => {
                let mut inner = EvaluationScan {
                    placeholder: self.placeholder,
                    deferred:    self.deferred,
                    eager:       true,
                };
                args.iter().for_each(|arg| inner.visit_expr(arg));
                self.eager &= inner.eager;
            },
            // no telling how often a raw macro body evaluates its tokens
            None if count_tokens(mac.tokens.clone(), self.placeholder) > 0 => self.eager = false,
            None => {},
        }
    }
}

/// `true` when the placeholder occurs exactly once in `body` and that
/// occurrence runs unconditionally, so the previous value can take its
/// place without a binding.
pub fn single_eager_occurrence(body: &Expr, placeholder: &Placeholder) -> bool {
    if count_free(body, placeholder) != 1 {
        return false;
    }
    let mut scan = EvaluationScan { placeholder, deferred: 0, eager: true };
    scan.visit_expr(body);
    scan.eager
}

enum Replacement<'a> {
    Var(&'a Ident),
    Value(&'a Expr),
}

struct PlaceholderSubst<'a> {
    placeholder: &'a Placeholder,
    replacement: Replacement<'a>,
}

impl PlaceholderSubst<'_> {
    fn replacement_at(&self, span: proc_macro2::Span) -> Expr {
        match self.replacement {
            Replacement::Var(var) => ident_expr(Ident::new(&var.to_string(), var.span().located_at(span))),
            Replacement::Value(value) => value.clone(),
        }
    }

    fn replace_tokens(&self, tokens: TokenStream) -> TokenStream {
        let mut replaced = TokenStream::new();
        for tree in tokens {
            match tree {
                TokenTree::Ident(ident) if self.placeholder.matches_ident(&ident) => {
                    self.replacement_at(ident.span()).to_tokens(&mut replaced)
                },
                TokenTree::Group(group) => {
                    let mut inner = Group::new(group.delimiter(), self.replace_tokens(group.stream()));
                    inner.set_span(group.span());
                    replaced.extend([TokenTree::Group(inner)]);
                },
                other => replaced.extend([other]),
            }
        }
        replaced
    }
}

impl VisitMut for PlaceholderSubst<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if self.placeholder.matches_expr(expr) {
            *expr = self.replacement_at(expr.span());
            return;
        }
        visit_mut::visit_expr_mut(self, expr);
    }

    fn visit_expr_closure_mut(&mut self, closure: &mut ExprClosure) {
        if !closure_shadows(closure, self.placeholder) {
            visit_mut::visit_expr_closure_mut(self, closure);
        }
    }

    fn visit_item_mut(&mut self, _: &mut Item) {}

    fn visit_macro_mut(&mut self, mac: &mut Macro) {
        match macro_args(mac) {
            Some(mut args) => {
                args.iter_mut().for_each(|arg| self.visit_expr_mut(arg));
                mac.tokens = args.into_token_stream();
            },
            None => mac.tokens = self.replace_tokens(mac.tokens.clone()),
        }
    }
}

/// Replaces every free occurrence of the placeholder in `expr` with `var`.
pub fn substitute(expr: &mut Expr, placeholder: &Placeholder, var: &Ident) {
    let mut subst = PlaceholderSubst { placeholder, replacement: Replacement::Var(var) };
    subst.visit_expr_mut(expr);
}

/// Replaces every free occurrence of the placeholder in `expr` with a copy
/// of `value`. The caller parenthesizes `value` when it is not atomic.
pub fn substitute_value(expr: &mut Expr, placeholder: &Placeholder, value: &Expr) {
    let mut subst = PlaceholderSubst { placeholder, replacement: Replacement::Value(value) };
    subst.visit_expr_mut(expr);
}
