use depspec_core::{AttributeShape, AttributeType, PrimitiveType, Schema, SettingType};
use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use std::collections::HashSet;
use syn::parse::{Parse, ParseStream};
use syn::{Ident, LitStr, Token, parse_macro_input};

/// Where the schema comes from: a file next to the calling crate's manifest,
/// or TOML embedded in the invocation.
enum SchemaSource {
    Path(LitStr),
    Inline(LitStr),
}

impl Parse for SchemaSource {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(LitStr) {
            return Ok(SchemaSource::Path(input.parse()?));
        }

        let key: Ident = input.parse()?;
        if key != "toml" {
            return Err(syn::Error::new(
                key.span(),
                "expected a schema path or `toml = \"...\"`",
            ));
        }
        input.parse::<Token![=]>()?;
        Ok(SchemaSource::Inline(input.parse()?))
    }
}

/// Generates typed dependency accessors from a depspec schema.
///
/// For every dependency kind the macro emits a marker type implementing
/// `depspec::DependencyKind` and an accessor with one method per attribute, so
/// a lookup path that is not in the schema simply does not compile. Nested
/// attributes get their own accessor plus a value struct for the whole object.
/// Every setting gets a marker type implementing `depspec::Setting`.
///
/// # Example
/// ```ignore
/// depspec::declare_schema!("depspec.toml");
///
/// use dependencies::Database;
/// use settings::VpcId;
///
/// fn main() -> depspec::Result<()> {
///     let bootstrap = depspec::BootstrapConfig::from_env()?;
///     let schema = depspec::load_schema("depspec.toml".as_ref())?;
///     let resolver = depspec::Resolver::new(&bootstrap, schema);
///
///     // DeferredReference<String>
///     let url = resolver.dependency::<Database>("svc1")?.url();
///     // DeferredReference<bool>
///     let readonly = resolver.dependency::<Database>("svc1")?.replica().readonly();
///     // DeferredReference<String>
///     let vpc = resolver.setting::<VpcId>()?;
///
///     println!("{url} {readonly} {vpc}");
///     Ok(())
/// }
/// ```
#[proc_macro]
pub fn declare_schema(input: TokenStream) -> TokenStream {
    let source = parse_macro_input!(input as SchemaSource);

    let (content, tracked) = match &source {
        SchemaSource::Path(lit) => {
            let path = lit.value();
            let manifest_dir =
                std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
            let full_path = std::path::Path::new(&manifest_dir).join(&path);
            match std::fs::read_to_string(&full_path) {
                Ok(content) => {
                    let full_path = full_path.to_string_lossy().into_owned();
                    // Rebuild when the schema file changes
                    (content, Some(quote! { const _: &str = include_str!(#full_path); }))
                }
                Err(e) => {
                    let error = format!("Failed to read {}: {}", path, e);
                    return syn::Error::new(lit.span(), error).to_compile_error().into();
                }
            }
        }
        SchemaSource::Inline(lit) => (lit.value(), None),
    };

    let schema: Schema = match content.parse() {
        Ok(schema) => schema,
        Err(e) => {
            let span = match &source {
                SchemaSource::Path(lit) | SchemaSource::Inline(lit) => lit.span(),
            };
            let error = format!("Invalid depspec schema: {}", e);
            return syn::Error::new(span, error).to_compile_error().into();
        }
    };

    match generate(&schema) {
        Ok(generated) => quote! {
            #tracked
            #generated
        }
        .into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn generate(schema: &Schema) -> syn::Result<TokenStream2> {
    let mut generator = Generator::default();

    for (kind, shape) in &schema.kinds {
        generator.kind(kind, shape)?;
    }

    let settings = schema
        .settings
        .iter()
        .map(|(name, ty)| setting_tokens(name, *ty))
        .collect::<syn::Result<Vec<_>>>()?;

    let items = generator.items;
    Ok(quote! {
        /// Typed accessors for the dependency kinds declared in the schema.
        pub mod dependencies {
            #(#items)*
        }

        /// Marker types for the settings declared in the schema.
        pub mod settings {
            #(#settings)*
        }
    })
}

#[derive(Default)]
struct Generator {
    items: Vec<TokenStream2>,
    type_names: HashSet<String>,
}

impl Generator {
    fn kind(&mut self, kind: &str, shape: &AttributeShape) -> syn::Result<()> {
        check_reserved(shape)?;
        let type_name = pascal_case(kind)?;
        self.claim(&type_name)?;

        let marker = Ident::new(&type_name, Span::call_site());
        let accessor = format_ident!("{}Accessor", type_name);
        let shape_expr = shape_tokens(shape);
        let doc = format!("The `{}` dependency kind.", kind);

        self.items.push(quote! {
            #[doc = #doc]
            #[derive(Debug, Clone, Copy, PartialEq, Eq)]
            pub struct #marker;

            impl ::depspec::DependencyKind for #marker {
                const NAME: &'static str = #kind;
                type Accessor = #accessor;

                fn shape() -> ::depspec::AttributeShape {
                    #shape_expr
                }
            }
        });

        self.node(&type_name, shape, false)
    }

    /// Emits the accessor for one shape node and recurses into nested objects.
    fn node(&mut self, name: &str, shape: &AttributeShape, nested: bool) -> syn::Result<()> {
        let accessor = format_ident!("{}Accessor", name);
        let mut methods = Vec::new();

        for (attribute, ty) in shape.iter() {
            let method = field_ident(attribute)?;
            match ty {
                AttributeType::Primitive(primitive) => {
                    let value = primitive_tokens(*primitive);
                    methods.push(quote! {
                        pub fn #method(&self) -> ::depspec::DeferredReference<#value> {
                            self.cursor.leaf(#attribute)
                        }
                    });
                }
                AttributeType::Object(inner) => {
                    let child = format!("{}{}", name, pascal_case(attribute)?);
                    self.claim(&child)?;
                    let child_accessor = format_ident!("{}Accessor", child);
                    self.value_struct(&child, inner)?;
                    self.node(&child, inner, true)?;
                    methods.push(quote! {
                        pub fn #method(&self) -> #child_accessor {
                            <#child_accessor as ::depspec::Accessor>::from_cursor(
                                self.cursor.child(#attribute),
                            )
                        }
                    });
                }
            }
        }

        if nested {
            let value = Ident::new(name, Span::call_site());
            methods.push(quote! {
                /// Reference to the whole object at this path.
                pub fn reference(&self) -> ::depspec::DeferredReference<#value> {
                    self.cursor.reference()
                }
            });
        }

        self.items.push(quote! {
            #[derive(Debug, Clone)]
            pub struct #accessor {
                cursor: ::depspec::PathCursor,
            }

            impl ::depspec::Accessor for #accessor {
                fn from_cursor(cursor: ::depspec::PathCursor) -> Self {
                    Self { cursor }
                }
            }

            impl #accessor {
                #(#methods)*
            }
        });

        Ok(())
    }

    /// Emits the deserializable value type of a nested object.
    fn value_struct(&mut self, name: &str, shape: &AttributeShape) -> syn::Result<()> {
        let ident = Ident::new(name, Span::call_site());
        let mut fields = Vec::new();

        for (attribute, ty) in shape.iter() {
            let field = field_ident(attribute)?;
            let value = match ty {
                AttributeType::Primitive(primitive) => primitive_tokens(*primitive),
                AttributeType::Object(_) => {
                    let child = format_ident!("{}{}", name, pascal_case(attribute)?);
                    quote! { #child }
                }
            };
            fields.push(quote! {
                #[serde(rename = #attribute)]
                pub #field: #value
            });
        }

        let shape = shape_tokens(shape);
        self.items.push(quote! {
            #[derive(Debug, Clone, PartialEq, ::depspec::__private::serde::Deserialize)]
            #[serde(crate = "depspec::__private::serde")]
            pub struct #ident {
                #(#fields,)*
            }

            impl ::depspec::ReferenceType for #ident {
                fn value_type() -> ::depspec::ValueType {
                    ::depspec::ValueType::Object(#shape)
                }
            }
        });

        Ok(())
    }

    /// Reserves `type_name` and its accessor's name.
    fn claim(&mut self, type_name: &str) -> syn::Result<()> {
        for name in [type_name.to_string(), format!("{}Accessor", type_name)] {
            if !self.type_names.insert(name.clone()) {
                return Err(syn::Error::new(
                    Span::call_site(),
                    format!("Two schema entries generate the same type name `{}`", name),
                ));
            }
        }
        Ok(())
    }
}

fn check_reserved(shape: &AttributeShape) -> syn::Result<()> {
    for (name, ty) in shape.iter() {
        if name == "reference" {
            return Err(syn::Error::new(
                Span::call_site(),
                "'reference' is reserved for accessors and cannot name an attribute",
            ));
        }
        if let AttributeType::Object(inner) = ty {
            check_reserved(inner)?;
        }
    }
    Ok(())
}

fn setting_tokens(name: &str, ty: SettingType) -> syn::Result<TokenStream2> {
    let marker = Ident::new(&pascal_case(name)?, Span::call_site());
    let value = match ty {
        SettingType::String => quote! { ::std::string::String },
        SettingType::StringList => quote! { ::std::vec::Vec<::std::string::String> },
    };
    let doc = format!("The `{}` setting.", name);

    Ok(quote! {
        #[doc = #doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct #marker;

        impl ::depspec::Setting for #marker {
            const NAME: &'static str = #name;
            type Value = #value;
        }
    })
}

fn primitive_tokens(primitive: PrimitiveType) -> TokenStream2 {
    match primitive {
        PrimitiveType::String => quote! { ::std::string::String },
        PrimitiveType::Number => quote! { f64 },
        PrimitiveType::Boolean => quote! { bool },
    }
}

fn shape_tokens(shape: &AttributeShape) -> TokenStream2 {
    let entries = shape.iter().map(|(name, ty)| {
        let ty = attribute_type_tokens(ty);
        quote! { (::std::string::String::from(#name), #ty) }
    });
    quote! {
        <::depspec::AttributeShape as ::std::iter::FromIterator<_>>::from_iter([#(#entries),*])
    }
}

fn attribute_type_tokens(ty: &AttributeType) -> TokenStream2 {
    match ty {
        AttributeType::Primitive(primitive) => {
            let variant = match primitive {
                PrimitiveType::String => quote! { String },
                PrimitiveType::Number => quote! { Number },
                PrimitiveType::Boolean => quote! { Boolean },
            };
            quote! { ::depspec::AttributeType::Primitive(::depspec::PrimitiveType::#variant) }
        }
        AttributeType::Object(inner) => {
            let inner = shape_tokens(inner);
            quote! { ::depspec::AttributeType::Object(#inner) }
        }
    }
}

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "static", "struct", "trait", "true", "try", "type", "unsafe", "use", "where",
    "while", "yield", "abstract", "become", "do", "final", "gen", "macro", "override", "priv",
    "typeof", "unsized", "virtual",
];

/// Identifiers that cannot even be written as raw identifiers.
const UNNAMEABLE: &[&str] = &["self", "super", "crate"];

fn field_ident(name: &str) -> syn::Result<Ident> {
    let snake = snake_case(name)?;
    if UNNAMEABLE.contains(&snake.as_str()) {
        return Err(syn::Error::new(
            Span::call_site(),
            format!("'{}' cannot be used as an attribute name", name),
        ));
    }
    if KEYWORDS.contains(&snake.as_str()) {
        Ok(Ident::new_raw(&snake, Span::call_site()))
    } else {
        Ok(Ident::new(&snake, Span::call_site()))
    }
}

/// Splits `UPPER_SNAKE`, `snake_case` and `camelCase` names into lowercase words.
fn words(name: &str) -> Vec<String> {
    let mut words = Vec::new();

    for part in name.split('_').filter(|p| !p.is_empty()) {
        if !part.chars().any(|c| c.is_ascii_lowercase()) {
            words.push(part.to_ascii_lowercase());
            continue;
        }

        let mut current = String::new();
        let mut prev_lower = false;
        for c in part.chars() {
            if c.is_ascii_uppercase() && prev_lower {
                words.push(current.to_ascii_lowercase());
                current.clear();
            }
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            current.push(c);
        }
        if !current.is_empty() {
            words.push(current.to_ascii_lowercase());
        }
    }

    words
}

fn pascal_case(name: &str) -> syn::Result<String> {
    let pascal: String = words(name)
        .iter()
        .map(|word| capitalize_first(word))
        .collect();
    checked_name(name, pascal)
}

fn snake_case(name: &str) -> syn::Result<String> {
    checked_name(name, words(name).join("_"))
}

fn checked_name(original: &str, converted: String) -> syn::Result<String> {
    match converted.chars().next() {
        Some(first) if first.is_ascii_alphabetic() => Ok(converted),
        _ => Err(syn::Error::new(
            Span::call_site(),
            format!("'{}' does not map to a Rust identifier", original),
        )),
    }
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}
