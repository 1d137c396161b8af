use proc_macro2::{Ident, Span};
use syn::punctuated::Punctuated;
use syn::*;

pub fn call_expr<I: IntoIterator<Item=Expr>, C: Into<Expr>>(call: C, args: I, span: Span) -> Expr {
    let fn_call = ExprCall {
        attrs: vec![],
        func: Box::new(call.into()),
        paren_token: token::Paren(span),
        args: Punctuated::from_iter(args),
    };
    fn_call.into()
}

pub fn create_ident(value: &str, span: Span) -> Ident {
    Ident::new(value, span)
}

pub fn ident_expr(ident: Ident) -> Expr {
    Expr::Path(ExprPath {
        attrs: vec![],
        qself: None,
        path: ident.into(),
    })
}

pub fn str_lit_expr(value: &str, span: Span) -> Expr {
    Expr::Lit(ExprLit {
        attrs: vec![],
        lit: Lit::Str(LitStr::new(value, span)),
    })
}

pub fn int_lit_expr(value: usize, span: Span) -> Expr {
    Expr::Lit(ExprLit {
        attrs: vec![],
        lit: Lit::Int(LitInt::new(&value.to_string(), span)),
    })
}

/// Expressions that can be a call target or a method receiver without
/// changing how the surrounding tokens parse.
pub fn is_atomic(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Path(_)
            | Expr::Lit(_)
            | Expr::Call(_)
            | Expr::MethodCall(_)
            | Expr::Field(_)
            | Expr::Index(_)
            | Expr::Paren(_)
            | Expr::Tuple(_)
            | Expr::Array(_)
            | Expr::Repeat(_)
            | Expr::Struct(_)
            | Expr::Macro(_)
            | Expr::Try(_)
            | Expr::Await(_)
            | Expr::Infer(_)
    )
}

pub fn paren(expr: Expr, span: Span) -> Expr {
    Expr::Paren(ExprParen {
        attrs: vec![],
        paren_token: token::Paren(span),
        expr: Box::new(expr),
    })
}

pub fn paren_if_needed(expr: Expr, span: Span) -> Expr {
    if is_atomic(&expr) {
        return expr;
    }
    paren(expr, span)
}

pub fn strip_parens(mut expr: &Expr) -> &Expr {
    loop {
        match expr {
            Expr::Paren(inner) => expr = &*inner.expr,
            Expr::Group(inner) => expr = &*inner.expr,
            _ => return expr,
        }
    }
}

pub fn into_stripped(expr: Expr) -> Expr {
    match expr {
        Expr::Paren(inner) => into_stripped(*inner.expr),
        Expr::Group(inner) => into_stripped(*inner.expr),
        other => other,
    }
}

/// `{ let <var> = <init>; <body> }`
pub fn let_block(var: Ident, init: Expr, body: Expr, span: Span) -> Expr {
    let expr_let = Local {
        attrs:      vec![],
        let_token:  Token![let](span),
        pat:        PatIdent {
            attrs:      vec![],
            by_ref:     None,
            mutability: None,
            ident:      var,
            subpat:     None,
        }
        .into(),
        init:       Some(LocalInit {
            eq_token: Token![=](span),
            expr:     Box::new(init),
            diverge:  None,
        }),
        semi_token: Token![;](span),
    };

    ExprBlock {
        attrs: vec![],
        label: None,
        block: Block {
            brace_token: token::Brace(span),
            stmts:       vec![
                Stmt::Local(expr_let),
                Stmt::Expr(body, None),
            ],
        },
    }
    .into()
}

/// The call target of `f(..)` when it is a single bare identifier.
pub fn call_ident(call: &ExprCall) -> Option<&Ident> {
    match call.func.as_ref() {
        Expr::Path(path) if path.qself.is_none() => path.path.get_ident(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quote::{quote, ToTokens};

    #[test]
    fn paren_only_where_needed() {
        let call: Expr = parse_quote!(f(x));
        assert_eq!(
            paren_if_needed(call, Span::call_site()).to_token_stream().to_string(),
            quote!(f(x)).to_string()
        );
        let sum: Expr = parse_quote!(a + b);
        assert_eq!(
            paren_if_needed(sum, Span::call_site()).to_token_stream().to_string(),
            quote!((a + b)).to_string()
        );
    }

    #[test]
    fn let_block_shape() {
        let block = let_block(
            create_ident("v", Span::call_site()),
            parse_quote!(seed()),
            parse_quote!(v + 1),
            Span::call_site(),
        );
        assert_eq!(
            block.to_token_stream().to_string(),
            quote!({ let v = seed(); v + 1 }).to_string()
        );
    }

    #[test]
    fn strips_nested_parens() {
        let expr: Expr = parse_quote!(((|x| x)));
        assert!(matches!(strip_parens(&expr), Expr::Closure(_)));
        assert!(matches!(into_stripped(expr), Expr::Closure(_)));
    }

    #[test]
    fn call_ident_only_for_bare_names() {
        let bare: ExprCall = parse_quote!(tap(f));
        assert_eq!(call_ident(&bare).map(|i| i.to_string()), Some("tap".to_string()));
        let pathed: ExprCall = parse_quote!(io::tap(f));
        assert_eq!(call_ident(&pathed), None);
    }
}
