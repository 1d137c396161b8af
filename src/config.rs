use std::collections::HashSet;
use std::fmt;

use proc_macro2::{Ident, Span};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::*;

use crate::error;
use crate::utils::create_ident;

pub const DEFAULT_SUBSTITUTION_VAR: &str = "__pipe_value";
pub const DEFAULT_TAP: &str = "tap";
pub const DEFAULT_THEN: &str = "then";

/// The symbol that stands for the previous stage's value inside a stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// `_`, parsed by syn as [`Expr::Infer`].
    Underscore,
    Ident(Ident),
}

impl Placeholder {
    pub fn matches_expr(&self, expr: &Expr) -> bool {
        match (self, expr) {
            (Placeholder::Underscore, Expr::Infer(_)) => true,
            (Placeholder::Ident(name), Expr::Path(path)) => {
                path.qself.is_none() && path.path.is_ident(name)
            }
            _ => false,
        }
    }

    /// Raw token check, used inside macro bodies that do not parse as
    /// expressions. `_` is an identifier token there.
    pub fn matches_ident(&self, ident: &Ident) -> bool {
        match self {
            Placeholder::Underscore => ident == "_",
            Placeholder::Ident(name) => ident == name,
        }
    }

    pub fn ident(&self) -> Option<&Ident> {
        match self {
            Placeholder::Underscore => None,
            Placeholder::Ident(name) => Some(name),
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::Underscore => f.write_str("_"),
            Placeholder::Ident(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugSink {
    Stderr,
    /// `fn(usize, &str, &dyn Debug)`
    Path(Path),
}

#[derive(Debug, Clone)]
enum PipeOption {
    Placeholder(Ident, Placeholder),
    SubstitutionVar(Ident, Ident),
    Operator(Ident, BinOp),
    Debug(Ident, bool),
    Sink(Ident, Path),
    Tap(Ident, Ident),
    Then(Ident, Ident),
}

impl PipeOption {
    fn key(&self) -> &Ident {
        use PipeOption::*;
        match self {
            Placeholder(key, _)
            | SubstitutionVar(key, _)
            | Operator(key, _)
            | Debug(key, _)
            | Sink(key, _)
            | Tap(key, _)
            | Then(key, _) => key,
        }
    }
}

impl Parse for PipeOption {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: Ident = input.parse()?;
        let name = key.to_string();

        // Bare `debug`
        if name == "debug" && !input.peek(Token![=]) {
            return Ok(PipeOption::Debug(key, true));
        }
        input.parse::<Token![=]>()?;

        match name.as_str() {
            "placeholder" => {
                let lookahead = input.lookahead1();
                if lookahead.peek(Token![_]) {
                    input.parse::<Token![_]>()?;
                    Ok(PipeOption::Placeholder(key, Placeholder::Underscore))
                }
                else if lookahead.peek(Ident) {
                    Ok(PipeOption::Placeholder(key, Placeholder::Ident(input.parse()?)))
                }
                else {
                    Err(lookahead.error())
                }
            },
            "substitution_var" => Ok(PipeOption::SubstitutionVar(key, parse_name(input)?)),
            "operator" => Ok(PipeOption::Operator(key, input.parse()?)),
            "debug" => {
                let flag: LitBool = input.parse()?;
                Ok(PipeOption::Debug(key, flag.value))
            },
            "sink" => Ok(PipeOption::Sink(key, input.parse()?)),
            "tap" => Ok(PipeOption::Tap(key, parse_name(input)?)),
            "then" => Ok(PipeOption::Then(key, parse_name(input)?)),
            _ => Err(error::configuration(
                key.span(),
                format!(
                    "unknown option `{name}`, expected one of `placeholder`, \
                     `substitution_var`, `operator`, `debug`, `sink`, `tap`, `then`"
                ),
            )),
        }
    }
}

fn parse_name(input: ParseStream) -> Result<Ident> {
    if input.peek(Token![_]) {
        let underscore: Token![_] = input.parse()?;
        return Err(error::configuration(
            underscore.span,
            "`_` can only be used as the placeholder",
        ));
    }
    input.parse()
}

/// Raw options of one `#[pipes(...)]` attribute.
#[derive(Debug, Clone, Default)]
pub struct PipeConfig {
    options: Vec<PipeOption>,
}

impl Parse for PipeConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let options = Punctuated::<PipeOption, Token![,]>::parse_terminated(input)?;
        Ok(Self {
            options: options.into_iter().collect(),
        })
    }
}

/// Options resolved once per annotated item. Never changes after
/// [`RewriteContext::new`] returns.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    pub placeholder:      Placeholder,
    pub substitution_var: Ident,
    pub operator:         BinOp,
    pub debug:            Option<DebugSink>,
    pub tap:              Ident,
    pub then:             Ident,
}

impl Default for RewriteContext {
    fn default() -> Self {
        Self {
            placeholder:      Placeholder::Underscore,
            substitution_var: create_ident(DEFAULT_SUBSTITUTION_VAR, Span::call_site()),
            operator:         BinOp::Shr(Default::default()),
            debug:            None,
            tap:              create_ident(DEFAULT_TAP, Span::call_site()),
            then:             create_ident(DEFAULT_THEN, Span::call_site()),
        }
    }
}

impl RewriteContext {
    pub fn new(config: PipeConfig) -> Result<Self> {
        let mut ctx = Self::default();
        let mut seen = HashSet::new();
        let mut debug_flag = None;
        let mut sink = None;

        for option in config.options {
            let key = option.key().clone();
            if !seen.insert(key.to_string()) {
                return Err(error::configuration(
                    key.span(),
                    format!("option `{key}` is given more than once"),
                ));
            }
            match option {
                PipeOption::Placeholder(_, placeholder) => ctx.placeholder = placeholder,
                PipeOption::SubstitutionVar(_, var) => ctx.substitution_var = var,
                PipeOption::Operator(_, op) => {
                    if is_assignment(&op) {
                        return Err(error::configuration(
                            op.span(),
                            "the pipe operator cannot be an assignment operator",
                        ));
                    }
                    ctx.operator = op;
                },
                PipeOption::Debug(_, flag) => debug_flag = Some(flag),
                PipeOption::Sink(_, path) => sink = Some(path),
                PipeOption::Tap(_, name) => ctx.tap = name,
                PipeOption::Then(_, name) => ctx.then = name,
            }
        }

        ctx.debug = match (debug_flag, sink) {
            (Some(false), Some(path)) => {
                return Err(error::configuration(
                    path.span(),
                    "`sink` is given but `debug` is disabled",
                ))
            },
            (_, Some(path)) => Some(DebugSink::Path(path)),
            (Some(true), None) => Some(DebugSink::Stderr),
            _ => None,
        };

        ctx.check_names()?;
        Ok(ctx)
    }

    fn check_names(&self) -> Result<()> {
        let var = &self.substitution_var;
        if let Some(placeholder) = self.placeholder.ident() {
            if placeholder == var {
                return Err(error::configuration(
                    var.span(),
                    format!("placeholder and substitution variable are both `{var}`"),
                ));
            }
            for marker in [&self.tap, &self.then] {
                if placeholder == marker {
                    return Err(error::configuration(
                        placeholder.span(),
                        format!("placeholder `{placeholder}` is also a marker name"),
                    ));
                }
            }
        }
        for marker in [&self.tap, &self.then] {
            if var == marker {
                return Err(error::configuration(
                    var.span(),
                    format!("substitution variable `{var}` is also a marker name"),
                ));
            }
        }
        if self.tap == self.then {
            return Err(error::configuration(
                self.then.span(),
                format!("`tap` and `then` markers are both named `{}`", self.then),
            ));
        }
        Ok(())
    }

    pub fn is_operator(&self, op: &BinOp) -> bool {
        // Token spans are ignored by the derived comparison
        &self.operator == op
    }
}

fn is_assignment(op: &BinOp) -> bool {
    use BinOp::*;
    matches!(
        op,
        AddAssign(_)
            | SubAssign(_)
            | MulAssign(_)
            | DivAssign(_)
            | RemAssign(_)
            | BitXorAssign(_)
            | BitAndAssign(_)
            | BitOrAssign(_)
            | ShlAssign(_)
            | ShrAssign(_)
    )
}
