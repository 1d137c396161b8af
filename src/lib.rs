//! # `pipes` – pipe operator chains for Rust functions
//!
//! `pipes` is an attribute macro that rewrites left-to-right chains such as
//! `value >> parse >> _ * 2 >> format!("{}!", _)` inside a function body
//! into ordinary nested calls, so a value can flow through a sequence of
//! transformations without temporary bindings.
//!
//! The attribute goes on a function, an `impl` block, a trait (default
//! method bodies) or an inline module. Expansion happens once, at compile
//! time; the generated code is plain Rust type-checked in the original scope.
//!
//! ## Stage shapes
//!
//! Each right-hand operand of the pipe operator is one stage. `prev` below
//! stands for the value produced by everything on the left.
//!
//! | Stage                        | Shape                 | Rewritten to                                   |
//! |------------------------------|-----------------------|------------------------------------------------|
//! | `f()`                        | Plain callable        | `f(prev)`                                      |
//! | `f(a, b)` / `obj.m(a)`       | Call with arguments   | `f(prev, a, b)` / `obj.m(prev, a)`             |
//! | `f(a, _)`                    | Call with placeholder | `f(a, prev)`                                   |
//! | `f` / `Vec::len` / `self.f`  | Bare callable         | `f(prev)` / `Vec::len(prev)` / `(self.f)(prev)`|
//! | `_.field` / `_.m(a)`         | Attribute or method   | `prev.field` / `prev.m(a)`                     |
//! | `_ + 5` / `-_` / `&_`        | Binary operator       | `prev + 5` / `-prev` / `&prev`                 |
//! | `[_, 1]` / `(_, 1)`          | Container             | `[prev, 1]`                                    |
//! | `format!("{}", _)`           | String interpolation  | `format!("{}", prev)`                          |
//! | `(\|x\| x * 2)`              | Anonymous function    | the closure applied to `prev`                  |
//! | `tap(f)`                     | Side effect           | calls `f(&prev)`, passes `prev` on unchanged   |
//! | `then(\|x\| x + 1)`          | Explicit promotion    | the closure applied to `prev`                  |
//!
//! `?` and `.await` after a call or callable stage are kept on the
//! rewritten call: `input >> parse()?` is `parse(input)?`.
//!
//! A stage that mentions the placeholder once takes `prev` in its place,
//! so `v >> &_` is `&v`. One that mentions it more than once evaluates `prev`
//! once and binds it to a generated variable (`__pipe_value` by default).
//! A closure stage must be parenthesized, otherwise its body would swallow
//! the rest of the chain.
//!
//! ## Options
//!
//! | Option             | Value                                    | Default        |
//! |--------------------|------------------------------------------|----------------|
//! | `placeholder`      | `_` or an identifier                     | `_`            |
//! | `substitution_var` | identifier                               | `__pipe_value` |
//! | `operator`         | binary operator                          | `>>`           |
//! | `debug`            | flag, `debug = true` or `debug = false`  | off            |
//! | `sink`             | path to `fn(usize, &str, &dyn Debug)`    | stderr         |
//! | `tap`              | side effect marker name                  | `tap`          |
//! | `then`             | promotion marker name                    | `then`         |
//!
//! A method or nested function carrying its own `#[pipes(...)]` uses its
//! own options.
//!
//! ## Examples
//!
//! ### Calls and shortcuts
//! ```
//! use pipes::pipes;
//!
//! fn double(x: i32) -> i32 {
//!     x * 2
//! }
//!
//! fn add(x: i32, y: i32) -> i32 {
//!     x + y
//! }
//!
//! #[pipes]
//! fn compute() -> i32 {
//!     5 >> double >> add(1) >> _ * 3
//! }
//!
//! assert_eq!(compute(), 33);
//!
//! // Without the pipe operator it would look like:
//! // (add(double(5), 1)) * 3
//! ```
//!
//! ### Method shortcuts
//! ```
//! use pipes::pipes;
//!
//! #[pipes]
//! fn large(values: Vec<i32>) -> Vec<i32> {
//!     values >> _.into_iter().filter(|x| *x > 3).collect::<Vec<_>>()
//! }
//!
//! assert_eq!(large(vec![1, 2, 3, 4, 5]), vec![4, 5]);
//! ```
//!
//! ### Closures and markers
//! ```
//! use pipes::pipes;
//!
//! fn record(value: &i32) {
//!     println!("seen {value}");
//! }
//!
//! #[pipes]
//! fn run() -> i32 {
//!     5 >> (|x| x * 2) >> tap(record) >> then(|x| x + 1)
//! }
//!
//! assert_eq!(run(), 11);
//! ```
//!
//! ### Named placeholder
//! ```
//! use pipes::pipes;
//!
//! #[pipes(placeholder = it)]
//! fn shout(name: &str) -> String {
//!     name >> it.to_uppercase() >> format!("{}!", it)
//! }
//!
//! assert_eq!(shout("core"), "CORE!");
//! ```
//!
//! ### Tracing every stage
//! ```
//! use std::fmt::Debug;
//! use pipes::pipes;
//!
//! fn trace(stage: usize, fragment: &str, value: &dyn Debug) {
//!     println!("#{stage} {fragment} => {value:?}");
//! }
//!
//! #[pipes(sink = trace)]
//! fn traced() -> i32 {
//!     2 >> _ + 1 >> _ * 10
//! }
//!
//! assert_eq!(traced(), 30);
//! ```

extern crate proc_macro;
pub(crate) mod chain;
pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod helpers;
pub(crate) mod loader;
pub(crate) mod placeholder;
pub(crate) mod stage;
pub(crate) mod utils;

use proc_macro::TokenStream;
use syn::{parse_macro_input, Item};

use crate::config::{PipeConfig, RewriteContext};

#[proc_macro_attribute]
pub fn pipes(attr: TokenStream, item: TokenStream) -> TokenStream {
    let config = parse_macro_input!(attr as PipeConfig);
    let item = parse_macro_input!(item as Item);

    match RewriteContext::new(config).and_then(|ctx| loader::expand(ctx, item)) {
        Ok(item) => quote::quote! { #item }.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
