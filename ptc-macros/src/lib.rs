//! Procedural macros for ptc-lisp builtin functions
//!
//! Provides the `#[builtin]` attribute macro for declaring native functions
//! together with their Lisp name and arity kind. The macro emits the function
//! unchanged plus a `register_*` function that inserts a `BuiltinDef` into
//! the builtin table.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Arity kind parsed from the attribute arguments.
#[derive(Debug, Clone)]
enum KindSpec {
    Normal(usize),
    Variadic,
    VariadicNonEmpty,
    MultiArity(Vec<usize>),
}

/// Parse builtin attribute arguments.
///
/// Accepted forms:
/// - `name = "count", arity = 1`
/// - `name = "+", variadic`
/// - `name = "-", variadic_nonempty`
/// - `name = "reduce", arities(2, 3)`
fn parse_builtin_args(attr_stream: TokenStream) -> (String, KindSpec) {
    let attr_str = attr_stream.to_string();

    let mut name = String::new();
    if let Some(start) = attr_str.find("name = \"") {
        let rest = &attr_str[start + 8..];
        if let Some(end) = rest.find('"') {
            name = rest[..end].to_string();
        }
    }

    // variadic_nonempty must be checked before variadic (prefix overlap)
    let kind = if attr_str.contains("variadic_nonempty") {
        KindSpec::VariadicNonEmpty
    } else if attr_str.contains("variadic") {
        KindSpec::Variadic
    } else if let Some(start) = attr_str.find("arities") {
        let rest = &attr_str[start..];
        let mut counts = Vec::new();
        if let (Some(open), Some(close)) = (rest.find('('), rest.find(')')) {
            for part in rest[open + 1..close].split(',') {
                if let Ok(n) = part.trim().parse::<usize>() {
                    counts.push(n);
                }
            }
        }
        KindSpec::MultiArity(counts)
    } else if let Some(start) = attr_str.find("arity = ") {
        let rest = &attr_str[start + 8..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        KindSpec::Normal(digits.parse().unwrap_or(0))
    } else {
        KindSpec::Variadic
    };

    (name, kind)
}

/// Attribute macro for declaring a Lisp builtin.
///
/// # Example
///
/// ```ignore
/// #[builtin(name = "count", arity = 1)]
/// pub fn builtin_count(interp: &mut Interp, args: &[Value]) -> Result<Value, LispError> {
///     // ...
/// }
/// ```
///
/// Expands to the function itself plus a `register_builtin_count` function
/// that inserts the definition into a `BuiltinTable`.
#[proc_macro_attribute]
pub fn builtin(attr: TokenStream, item: TokenStream) -> TokenStream {
    let func = parse_macro_input!(item as ItemFn);

    let (lisp_name, kind) = parse_builtin_args(attr);

    let fn_name = func.sig.ident.clone();
    let name_to_use = if !lisp_name.is_empty() {
        lisp_name
    } else {
        fn_name.to_string().replace('_', "-")
    };

    let kind_tokens = match kind {
        KindSpec::Normal(n) => quote! { crate::value::BuiltinKind::Normal(#n) },
        KindSpec::Variadic => quote! { crate::value::BuiltinKind::Variadic },
        KindSpec::VariadicNonEmpty => quote! { crate::value::BuiltinKind::VariadicNonEmpty },
        KindSpec::MultiArity(counts) => {
            quote! { crate::value::BuiltinKind::MultiArity(&[#(#counts),*]) }
        }
    };

    let register_fn_name = quote::format_ident!("register_{}", fn_name);

    let expanded = quote! {
        #func

        #[doc(hidden)]
        pub fn #register_fn_name(table: &mut crate::builtins::BuiltinTable) {
            static DEF: crate::value::BuiltinDef = crate::value::BuiltinDef {
                name: #name_to_use,
                kind: #kind_tokens,
                func: #fn_name,
            };
            table.insert(&DEF);
        }
    };

    TokenStream::from(expanded)
}
