use proc_macro2::{Ident, Span};
use syn::spanned::Spanned;
use syn::*;

use crate::config::RewriteContext;
use crate::error;
use crate::helpers::{Helper, HelperUsage};
use crate::placeholder::*;
use crate::utils::*;

/// Tag of a [`Shape`], without the rewrite data.
#[cfg(test)]
#[derive(Debug, Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub enum ShapeCategory {
    PlainCallable,
    CallWithArgs,
    BareCallable,
    AttributeOrMethodShortcut,
    BinaryOperatorShortcut,
    ContainerOrComprehensionShortcut,
    StringInterpolationShortcut,
    AnonymousFunctionShortcut,
    SideEffectMarker,
    ExplicitPromotionMarker,
}

/// `?` and `.await` written after a call or callable stage. They are
/// re-applied to the rewritten call: `x >> parse()?` is `parse(x)?`.
#[derive(Debug, Clone)]
pub enum Postfix {
    Try(Token![?]),
    Await(Token![.], Token![await]),
}

impl Postfix {
    fn wrap(self, expr: Expr) -> Expr {
        match self {
            Postfix::Try(question_token) => Expr::Try(ExprTry {
                attrs: vec![],
                expr: Box::new(expr),
                question_token,
            }),
            Postfix::Await(dot_token, await_token) => Expr::Await(ExprAwait {
                attrs: vec![],
                base: Box::new(expr),
                dot_token,
                await_token,
            }),
        }
    }
}

/// Peels postfix operators, innermost first in the returned list.
fn peel_postfix(mut expr: Expr) -> (Expr, Vec<Postfix>) {
    let mut postfix = Vec::new();
    loop {
        expr = match expr {
            Expr::Try(try_expr) => {
                postfix.push(Postfix::Try(try_expr.question_token));
                *try_expr.expr
            },
            Expr::Await(await_expr) => {
                postfix.push(Postfix::Await(await_expr.dot_token, await_expr.await_token));
                *await_expr.base
            },
            core => {
                postfix.reverse();
                return (core, postfix);
            },
        }
    }
}

#[derive(Debug, Clone)]
pub enum CallTarget {
    Fn(ExprCall),
    Method(ExprMethodCall),
}

impl CallTarget {
    fn arg_count(&self) -> usize {
        match self {
            CallTarget::Fn(call) => call.args.len(),
            CallTarget::Method(call) => call.args.len(),
        }
    }
}

/// A call or callable plus the postfix operators that followed it.
#[derive(Debug, Clone)]
pub struct Applied<T> {
    pub target:  T,
    pub postfix: Vec<Postfix>,
}

impl<T> Applied<T> {
    fn finish(postfix: Vec<Postfix>, expr: Expr) -> Expr {
        postfix.into_iter().fold(expr, |expr, op| op.wrap(expr))
    }
}

impl Applied<CallTarget> {
    /// `f(a, b)` becomes `f(prev, a, b)`, `obj.m(a)` becomes `obj.m(prev, a)`.
    fn insert_first(self, prev: Expr) -> Expr {
        let call = match self.target {
            CallTarget::Fn(mut call) => {
                call.args.insert(0, prev);
                Expr::Call(call)
            },
            CallTarget::Method(mut call) => {
                call.args.insert(0, prev);
                Expr::MethodCall(call)
            },
        };
        Self::finish(self.postfix, call)
    }
}

impl Applied<Expr> {
    /// `f` becomes `f(prev)`.
    fn call_with(self, prev: Expr, span: Span) -> Expr {
        let callee = match self.target {
            // `obj.f(prev)` would be a method call
            field @ Expr::Field(_) => paren(field, span),
            other => paren_if_needed(other, span),
        };
        Self::finish(self.postfix, call_expr(callee, [prev], span))
    }
}

/// A stage that mentions the placeholder, bound to the previous value.
#[derive(Debug, Clone)]
pub struct Substitution {
    pub body:   Expr,
    /// The placeholder occurs once and always runs, so the previous value
    /// takes its place directly: `&_` is `&prev`, not a borrow of a local.
    pub inline: bool,
}

impl Substitution {
    fn apply(self, prev: Expr, ctx: &RewriteContext, span: Span) -> Expr {
        let mut body = self.body;
        if self.inline {
            substitute_value(&mut body, &ctx.placeholder, &paren_if_needed(prev, span));
            return body;
        }
        let var = &ctx.substitution_var;
        substitute(&mut body, &ctx.placeholder, var);
        let binding = Ident::new(&var.to_string(), var.span().located_at(span));
        let_block(binding, prev, body, span)
    }
}

#[derive(Debug, Clone)]
pub enum CallArgs {
    /// No placeholder: the previous value becomes the first argument.
    Prepend(Applied<CallTarget>),
    /// The placeholder marks where the previous value goes.
    Substitute(Substitution),
}

/// One rewrite rule per category.
#[derive(Debug, Clone)]
pub enum Shape {
    PlainCallable(Applied<CallTarget>),
    CallWithArgs(CallArgs),
    BareCallable(Applied<Expr>),
    AttributeOrMethodShortcut(Substitution),
    BinaryOperatorShortcut(Substitution),
    ContainerOrComprehensionShortcut(Substitution),
    StringInterpolationShortcut(Substitution),
    AnonymousFunctionShortcut(ExprClosure),
    SideEffectMarker(Expr),
    ExplicitPromotionMarker(ExprClosure),
}

fn is_marker(call: &ExprCall, marker: &Ident) -> bool {
    call_ident(call).map_or(false, |ident| ident == marker)
}

fn single_arg(call: &ExprCall) -> Option<&Expr> {
    if call.args.len() == 1 {
        call.args.first()
    }
    else {
        None
    }
}

impl Shape {
    /// First matching rule wins: markers, closures, placeholder shortcuts,
    /// calls, bare callables.
    pub fn classify(raw: Expr, ctx: &RewriteContext) -> Result<Self> {
        match raw {
            Expr::Call(call) if is_marker(&call, &ctx.tap) => Self::side_effect(call),
            Expr::Call(call) if is_marker(&call, &ctx.then) => Self::promotion(call),
            other => Self::classify_unmarked(other, ctx),
        }
    }

    fn side_effect(call: ExprCall) -> Result<Self> {
        match single_arg(&call) {
            Some(callable) => Ok(Shape::SideEffectMarker(callable.clone())),
            None => Err(error::unsupported_stage(
                &call,
                "the side effect marker takes exactly one callable",
            )),
        }
    }

    fn promotion(call: ExprCall) -> Result<Self> {
        match single_arg(&call).map(strip_parens) {
            Some(Expr::Closure(closure)) if closure.inputs.len() == 1 => {
                Ok(Shape::ExplicitPromotionMarker(closure.clone()))
            },
            _ => Err(error::unsupported_stage(
                &call,
                "the promotion marker takes a single-argument closure",
            )),
        }
    }

    fn classify_unmarked(raw: Expr, ctx: &RewriteContext) -> Result<Self> {
        let placeholder = &ctx.placeholder;

        if let Expr::Closure(closure) = strip_parens(&raw) {
            if count_free(strip_parens(&raw), placeholder) == 0 {
                return Ok(Shape::AnonymousFunctionShortcut(closure.clone()));
            }
            return Ok(Shape::ContainerOrComprehensionShortcut(Substitution {
                body:   into_stripped(raw),
                inline: false,
            }));
        }

        if count_outside_closures(&raw, placeholder) > 0 {
            return Self::substitution(into_stripped(raw), ctx);
        }

        Self::callable(raw, ctx)
    }

    fn substitution(body: Expr, ctx: &RewriteContext) -> Result<Self> {
        let placeholder = &ctx.placeholder;
        let wrapped = |body: Expr| {
            let inline = single_eager_occurrence(&body, placeholder);
            Substitution { body, inline }
        };

        match &body {
            Expr::Field(_)
            | Expr::MethodCall(_)
            | Expr::Index(_)
            | Expr::Try(_)
            | Expr::Await(_)
            | Expr::Infer(_)
            | Expr::Path(_) => Ok(Shape::AttributeOrMethodShortcut(wrapped(body))),
            Expr::Binary(_)
            | Expr::Unary(_)
            | Expr::Reference(_)
            | Expr::Cast(_)
            | Expr::Range(_) => Ok(Shape::BinaryOperatorShortcut(wrapped(body))),
            Expr::Array(_)
            | Expr::Tuple(_)
            | Expr::Struct(_)
            | Expr::Repeat(_)
            | Expr::Block(_)
            | Expr::Closure(_)
            | Expr::If(_)
            | Expr::Match(_) => Ok(Shape::ContainerOrComprehensionShortcut(wrapped(body))),
            Expr::Macro(_) => Ok(Shape::StringInterpolationShortcut(wrapped(body))),
            Expr::Call(_) => Ok(Shape::CallWithArgs(CallArgs::Substitute(wrapped(body)))),
            _ => Err(error::unsupported_stage(
                &body,
                format!("the placeholder `{placeholder}` cannot be used in this kind of expression"),
            )),
        }
    }

    fn callable(raw: Expr, ctx: &RewriteContext) -> Result<Self> {
        let (core, postfix) = peel_postfix(raw);
        match core {
            Expr::Call(call) => Ok(Self::call(CallTarget::Fn(call), postfix)),
            Expr::MethodCall(call) => Ok(Self::call(CallTarget::Method(call), postfix)),
            target @ (Expr::Path(_) | Expr::Field(_) | Expr::Index(_) | Expr::Paren(_) | Expr::Group(_)) => {
                Ok(Shape::BareCallable(Applied { target, postfix }))
            },
            Expr::Macro(mac) => Err(error::unsupported_stage(
                &mac,
                format!("a macro stage must use the placeholder `{}`", ctx.placeholder),
            )),
            Expr::Lit(lit) => Err(error::unsupported_stage(&lit, "a literal is not callable")),
            other => Err(error::unsupported_stage(
                &other,
                format!(
                    "expected a function, a call, a closure or an expression using the placeholder `{}`",
                    ctx.placeholder
                ),
            )),
        }
    }

    fn call(target: CallTarget, postfix: Vec<Postfix>) -> Self {
        let applied = Applied { target, postfix };
        if applied.target.arg_count() == 0 {
            Shape::PlainCallable(applied)
        }
        else {
            Shape::CallWithArgs(CallArgs::Prepend(applied))
        }
    }

    #[cfg(test)]
    pub fn category(&self) -> ShapeCategory {
        use ShapeCategory::*;
        match self {
            Shape::PlainCallable(_) => PlainCallable,
            Shape::CallWithArgs(_) => CallWithArgs,
            Shape::BareCallable(_) => BareCallable,
            Shape::AttributeOrMethodShortcut(_) => AttributeOrMethodShortcut,
            Shape::BinaryOperatorShortcut(_) => BinaryOperatorShortcut,
            Shape::ContainerOrComprehensionShortcut(_) => ContainerOrComprehensionShortcut,
            Shape::StringInterpolationShortcut(_) => StringInterpolationShortcut,
            Shape::AnonymousFunctionShortcut(_) => AnonymousFunctionShortcut,
            Shape::SideEffectMarker(_) => SideEffectMarker,
            Shape::ExplicitPromotionMarker(_) => ExplicitPromotionMarker,
        }
    }
}

/// One classified right-hand operand of the pipe operator.
#[derive(Debug, Clone)]
pub struct Stage {
    pub shape:    Shape,
    pub span:     Span,
    /// Source text of the raw stage, for debug output.
    pub fragment: String,
}

impl Stage {
    pub fn classify(raw: Expr, ctx: &RewriteContext) -> Result<Self> {
        let span = raw.span();
        let fragment = error::render(&raw);
        Ok(Stage {
            shape: Shape::classify(raw, ctx)?,
            span,
            fragment,
        })
    }

    #[cfg(test)]
    pub fn category(&self) -> ShapeCategory {
        self.shape.category()
    }

    /// Builds the expression that feeds `prev` through this stage.
    pub fn apply(self, prev: Expr, ctx: &RewriteContext, helpers: &mut HelperUsage) -> Expr {
        let span = self.span;
        match self.shape {
            Shape::PlainCallable(applied) => applied.insert_first(prev),
            Shape::CallWithArgs(CallArgs::Prepend(applied)) => applied.insert_first(prev),
            Shape::CallWithArgs(CallArgs::Substitute(subst)) => subst.apply(prev, ctx, span),
            Shape::BareCallable(applied) => applied.call_with(prev, span),
            Shape::AttributeOrMethodShortcut(subst)
            | Shape::BinaryOperatorShortcut(subst)
            | Shape::ContainerOrComprehensionShortcut(subst)
            | Shape::StringInterpolationShortcut(subst) => subst.apply(prev, ctx, span),
            Shape::AnonymousFunctionShortcut(closure) | Shape::ExplicitPromotionMarker(closure) => {
                helpers.call(Helper::Apply, [prev, Expr::Closure(closure)], span)
            },
            Shape::SideEffectMarker(callable) => helpers.call(Helper::Tap, [prev, callable], span),
        }
    }
}
