//! TestGrid Macros
//!
//! Procedural macro for test registration.
//!
//! ## Macros
//!
//! - `#[register_test]` - Register a plain function as a test in the
//!   link-time manifest, inferring input roles and parameters from its
//!   signature

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{FnArg, ItemFn, Pat, Type, parse_macro_input};

// ============================================================================
// Attribute Parsing Helpers
// ============================================================================

mod attr {
    use syn::meta::ParseNestedMeta;

    /// Get the attribute name as a string
    pub fn name(meta: &ParseNestedMeta) -> String {
        meta.path
            .get_ident()
            .map(|i| i.to_string())
            .unwrap_or_default()
    }

    /// Parse a string literal attribute: `attr = "value"`
    pub fn string(meta: &ParseNestedMeta) -> syn::Result<String> {
        let value: syn::LitStr = meta.value()?.parse()?;
        Ok(value.value())
    }

    /// Parse a comma-separated string as a list: `tags = "a, b, c"`
    pub fn list(meta: &ParseNestedMeta) -> syn::Result<Vec<String>> {
        let value: syn::LitStr = meta.value()?.parse()?;
        Ok(value
            .value()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    /// Create an unknown attribute error
    pub fn unknown(meta: &ParseNestedMeta, name: &str) -> syn::Error {
        meta.error(format!("unknown attribute: {}", name))
    }
}

#[derive(Default)]
struct TestConfig {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    tasks: Vec<String>,
    tags: Vec<String>,
    params: Vec<(String, syn::Expr)>,
}

fn parse_test_config(args: TokenStream2) -> Result<TestConfig, syn::Error> {
    let mut config = TestConfig::default();
    if args.is_empty() {
        return Ok(config);
    }

    let parser = syn::meta::parser(|meta| {
        let name = attr::name(&meta);
        match name.as_str() {
            "id" => config.id = Some(attr::string(&meta)?),
            "name" => config.name = Some(attr::string(&meta)?),
            "description" => config.description = Some(attr::string(&meta)?),
            "tasks" => config.tasks = attr::list(&meta)?,
            "tags" => config.tags = attr::list(&meta)?,
            "params" => meta.parse_nested_meta(|param| {
                let param_name = attr::name(&param);
                let value: syn::Expr = param.value()?.parse()?;
                config.params.push((param_name, value));
                Ok(())
            })?,
            _ => return Err(attr::unknown(&meta, &name)),
        }
        Ok(())
    });

    syn::parse::Parser::parse2(parser, args)?;
    Ok(config)
}

/// What a function argument binds to
enum ArgKind {
    Dataset(String),
    Model(String),
    Datasets(String),
    Models(String),
    AllInputs,
    AllParams,
    Param(String, Box<Type>),
}

fn last_segment(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

fn classify(name: &str, ty: &Type) -> ArgKind {
    if let Type::Reference(reference) = ty {
        match reference.elem.as_ref() {
            Type::Slice(slice) => {
                if let Type::Reference(item) = slice.elem.as_ref() {
                    match last_segment(&item.elem).as_deref() {
                        Some("Dataset") => return ArgKind::Datasets(name.to_string()),
                        Some("Model") => return ArgKind::Models(name.to_string()),
                        _ => {}
                    }
                }
            }
            elem => match last_segment(elem).as_deref() {
                Some("Dataset") => return ArgKind::Dataset(name.to_string()),
                Some("Model") => return ArgKind::Model(name.to_string()),
                Some("BoundInputs") => return ArgKind::AllInputs,
                Some("Params") => return ArgKind::AllParams,
                _ => {}
            },
        }
    }
    ArgKind::Param(name.to_string(), Box::new(ty.clone()))
}

/// Doc comment lines joined with newlines
fn doc_comment(func: &ItemFn) -> String {
    let lines: Vec<String> = func
        .attrs
        .iter()
        .filter(|a| a.path().is_ident("doc"))
        .filter_map(|a| match &a.meta {
            syn::Meta::NameValue(nv) => match &nv.value {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(s),
                    ..
                }) => Some(s.value().trim().to_string()),
                _ => None,
            },
            _ => None,
        })
        .collect();
    lines.join("\n").trim().to_string()
}

/// Register a function as a test
///
/// Arguments typed `&Dataset`, `&Model`, `&[&Dataset]` or `&[&Model]` become
/// required input roles named after the argument. `&BoundInputs` and
/// `&Params` receive everything. Any other argument is a parameter read with
/// `Params::get` and must have a default in `params(...)`. The return type
/// must implement `IntoOutput`.
///
/// # Example
///
/// ```ignore
/// /// Checks that every class holds a minimum share of the rows
/// #[register_test(
///     id = "validmind.data_validation.ClassImbalance",
///     tasks = "classification",
///     tags = "tabular_data, binary_classification",
///     params(min_percent_threshold = 10.0)
/// )]
/// fn class_imbalance(dataset: &Dataset, min_percent_threshold: f64) -> anyhow::Result<RawOutput> {
///     ...
/// }
/// ```
#[proc_macro_attribute]
pub fn register_test(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = TokenStream2::from(args);
    let func = parse_macro_input!(item as ItemFn);

    register_test_impl(args, func)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn register_test_impl(args: TokenStream2, func: ItemFn) -> Result<TokenStream2, syn::Error> {
    if func.sig.asyncness.is_some() {
        return Err(syn::Error::new_spanned(
            &func.sig,
            "TestGrid: test functions must be synchronous",
        ));
    }

    let config = parse_test_config(args)?;
    let fn_name = &func.sig.ident;

    let id = config.id.clone().ok_or_else(|| {
        syn::Error::new_spanned(
            &func.sig.ident,
            "TestGrid: missing `id = \"namespace.path.Leaf\"`",
        )
    })?;
    if !id.contains('.') {
        return Err(syn::Error::new_spanned(
            &func.sig.ident,
            format!("TestGrid: id '{}' has no namespace separator", id),
        ));
    }
    let name = config
        .name
        .clone()
        .unwrap_or_else(|| id.rsplit('.').next().unwrap_or(&id).to_string());
    let description = config.description.clone().unwrap_or_else(|| doc_comment(&func));

    let wrapper_name = format_ident!("_testgrid_run_{}", fn_name);
    let defaults_name = format_ident!("_testgrid_defaults_{}", fn_name);

    let mut roles: Vec<String> = Vec::new();
    let mut bindings: Vec<TokenStream2> = Vec::new();
    let mut call_args: Vec<TokenStream2> = Vec::new();
    let mut declared: Vec<String> = Vec::new();

    for (index, arg) in func.sig.inputs.iter().enumerate() {
        let FnArg::Typed(typed) = arg else {
            return Err(syn::Error::new_spanned(arg, "TestGrid: methods cannot be registered"));
        };
        let Pat::Ident(pat) = typed.pat.as_ref() else {
            return Err(syn::Error::new_spanned(
                &typed.pat,
                "TestGrid: arguments must be plain identifiers",
            ));
        };
        let arg_name = pat.ident.to_string();
        let local = format_ident!("__arg{}", index);

        match classify(&arg_name, &typed.ty) {
            ArgKind::Dataset(role) => {
                bindings.push(quote! { let #local = __inputs.dataset(#role)?; });
                call_args.push(quote! { #local });
                roles.push(role);
            }
            ArgKind::Model(role) => {
                bindings.push(quote! { let #local = __inputs.model(#role)?; });
                call_args.push(quote! { #local });
                roles.push(role);
            }
            ArgKind::Datasets(role) => {
                bindings.push(quote! { let #local = __inputs.datasets(#role)?; });
                call_args.push(quote! { &#local });
                roles.push(role);
            }
            ArgKind::Models(role) => {
                bindings.push(quote! { let #local = __inputs.models(#role)?; });
                call_args.push(quote! { &#local });
                roles.push(role);
            }
            ArgKind::AllInputs => call_args.push(quote! { __inputs }),
            ArgKind::AllParams => call_args.push(quote! { __params }),
            ArgKind::Param(param, ty) => {
                if !config.params.iter().any(|(n, _)| *n == param) {
                    return Err(syn::Error::new_spanned(
                        &typed.ty,
                        format!(
                            "TestGrid: parameter `{}` needs a default, e.g. params({} = ...)",
                            param, param
                        ),
                    ));
                }
                bindings.push(quote! { let #local: #ty = __params.get(#param)?; });
                call_args.push(quote! { #local });
                declared.push(param);
            }
        }
    }

    let accepts_all_params = func
        .sig
        .inputs
        .iter()
        .any(|arg| matches!(arg, FnArg::Typed(t) if last_segment_of_ref(&t.ty).as_deref() == Some("Params")));
    if !accepts_all_params {
        if let Some((unused, _)) = config.params.iter().find(|(n, _)| !declared.contains(n)) {
            return Err(syn::Error::new_spanned(
                &func.sig.ident,
                format!("TestGrid: params({} = ...) matches no function argument", unused),
            ));
        }
    }

    let default_entries: Vec<TokenStream2> = config
        .params
        .iter()
        .map(|(param, value)| {
            quote! { .with(#param, ::testgrid::internal::serde_json::json!(#value)) }
        })
        .collect();
    let tasks = &config.tasks;
    let tags = &config.tags;

    Ok(quote! {
        #func

        #[doc(hidden)]
        #[allow(non_snake_case, unused_variables)]
        fn #wrapper_name(
            __inputs: &::testgrid::BoundInputs,
            __params: &::testgrid::Params,
        ) -> ::testgrid::internal::anyhow::Result<::testgrid::RawOutput> {
            #(#bindings)*
            ::testgrid::IntoOutput::into_output(#fn_name(#(#call_args),*))
        }

        #[doc(hidden)]
        #[allow(non_snake_case)]
        fn #defaults_name() -> ::testgrid::Params {
            ::testgrid::Params::new() #(#default_entries)*
        }

        ::testgrid::internal::inventory::submit! {
            ::testgrid::TestDef {
                id: #id,
                name: #name,
                description: #description,
                tasks: &[#(#tasks),*],
                tags: &[#(#tags),*],
                required_inputs: &[#(#roles),*],
                default_params: #defaults_name,
                run_fn: #wrapper_name,
                file: file!(),
                line: line!(),
                module_path: module_path!(),
            }
        }
    })
}

fn last_segment_of_ref(ty: &Type) -> Option<String> {
    match ty {
        Type::Reference(reference) => last_segment(&reference.elem),
        _ => None,
    }
}
