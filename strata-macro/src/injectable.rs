use darling::ast::Data;
use darling::util::Ignored;
use darling::{FromDeriveInput, FromField};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{DeriveInput, GenericArgument, Path, PathArguments, Type, parse_macro_input};

#[derive(FromDeriveInput)]
#[darling(attributes(injectable), supports(struct_named))]
struct InjectableInput {
    ident: syn::Ident,
    generics: syn::Generics,
    data: Data<Ignored, InjectField>,
    #[darling(default)]
    destroy: Option<syn::Ident>,
    #[darling(default)]
    registrator: Option<Path>,
    #[darling(multiple, rename = "base")]
    bases: Vec<Path>,
}

#[derive(FromField)]
#[darling(attributes(inject))]
struct InjectField {
    ident: Option<syn::Ident>,
    ty: Type,
    #[darling(default)]
    guard: Option<Path>,
    #[darling(default)]
    id: Option<String>,
    #[darling(default)]
    default: bool,
    #[darling(default)]
    container: bool,
    #[darling(default)]
    property: bool,
}

pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let expanded = InjectableInput::from_derive_input(&input)
        .and_then(|parsed| generate_injectable_impl(&parsed));
    match expanded {
        Ok(tokens) => TokenStream::from(tokens),
        Err(e) => TokenStream::from(e.write_errors()),
    }
}

#[derive(Default)]
struct Generated {
    parameters: Vec<TokenStream2>,
    injections: Vec<TokenStream2>,
    inits: Vec<TokenStream2>,
    property_arms: Vec<TokenStream2>,
}

fn generate_injectable_impl(input: &InjectableInput) -> darling::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(fields) => &fields.fields,
        Data::Enum(_) => {
            return Err(darling::Error::custom(
                "#[derive(Injectable)] can only be applied to structs",
            ));
        }
    };

    let mut generated = Generated::default();
    let mut errors = darling::Error::accumulator();
    let mut index = 0usize;
    for field in fields {
        errors.handle(generate_field(field, &mut index, &mut generated));
    }
    errors.finish()?;

    let Generated {
        parameters,
        injections,
        inits,
        property_arms,
    } = generated;

    let set_property = if property_arms.is_empty() {
        quote!()
    } else {
        quote! {
            fn set_property(
                &mut self,
                name: &str,
                value: ::strata::Instance,
            ) -> ::strata::Result<()> {
                match name {
                    #(#property_arms)*
                    _ => Err(::strata::StrataError::construction(
                        ::std::any::type_name::<Self>(),
                        format!("no injectable property '{}'", name),
                    )),
                }
            }
        }
    };

    let destroy = input.destroy.as_ref().map(|method| {
        quote! {
            fn destroy(&self) -> ::strata::anyhow::Result<()> {
                self.#method()
            }
        }
    });

    let registrator = input.registrator.as_ref().map(|path| {
        quote! {
            fn registrator() -> ::core::option::Option<::strata::Registrator> {
                ::core::option::Option::Some(#path())
            }
        }
    });

    let bases = if input.bases.is_empty() {
        quote!()
    } else {
        let bases = &input.bases;
        quote! {
            fn bases() -> ::std::vec::Vec<::strata::ServiceId> {
                vec![#(::strata::ServiceId::of::<#bases>()),*]
            }
        }
    };

    Ok(quote! {
        impl #impl_generics ::strata::Injectable for #struct_name #ty_generics #where_clause {
            fn parameters() -> ::std::vec::Vec<::strata::Parameter> {
                vec![#(#parameters),*]
            }

            fn injections() -> ::std::vec::Vec<::strata::Injection> {
                vec![#(#injections),*]
            }

            #bases

            #[allow(unused_mut, unused_variables)]
            fn construct(mut args: ::strata::Arguments) -> ::strata::Result<Self> {
                Ok(Self {
                    #(#inits),*
                })
            }

            #set_property

            #destroy

            #registrator
        }
    })
}

fn generate_field(
    field: &InjectField,
    index: &mut usize,
    out: &mut Generated,
) -> darling::Result<()> {
    let Some(ident) = &field.ident else {
        return Err(darling::Error::custom("expected a named field").with_span(&field.ty));
    };
    let name = ident.to_string();
    let target = field
        .id
        .as_ref()
        .map(|id| quote!(.target(::strata::Target::id(#id))));

    if field.default {
        out.inits
            .push(quote!(#ident: ::core::default::Default::default()));
        return Ok(());
    }

    if field.container || is_container_handle(&field.ty) {
        out.inits.push(quote!(#ident: args.container().clone()));
        return Ok(());
    }

    if field.property {
        let Some(inner) = option_inner(&field.ty).and_then(arc_inner) else {
            return Err(darling::Error::custom(
                "an injected property must be declared as Option<Arc<T>>",
            )
            .with_span(&field.ty));
        };
        let Some(guard) = &field.guard else {
            return Err(
                darling::Error::custom("an injected property needs a guard").with_span(ident)
            );
        };

        out.injections
            .push(quote!(::strata::Injection::property::<#inner>(#name, #guard) #target));
        out.inits.push(quote!(#ident: ::core::option::Option::None));
        out.property_arms.push(quote! {
            #name => {
                self.#ident = ::core::option::Option::Some(::strata::downcast::<#inner>(value)?);
                Ok(())
            }
        });
        return Ok(());
    }

    let position = *index;
    if let Some(inner) = arc_inner(&field.ty) {
        let parameter = match (&field.guard, &field.id) {
            (None, Some(id)) => quote!(::strata::Parameter::id(#id)),
            _ => quote!(::strata::Parameter::of::<#inner>()),
        };
        out.parameters.push(quote!(#parameter.named(#name)));
        if let Some(guard) = &field.guard {
            out.injections
                .push(quote!(::strata::Injection::parameter(#position, #guard) #target));
        }
        out.inits
            .push(quote!(#ident: args.take::<#inner>(#position)?));
    } else if let Some(inner) = option_inner(&field.ty).and_then(arc_inner) {
        if field.guard.is_some() || field.id.is_some() {
            return Err(darling::Error::custom(
                "optional parameters are resolved by type only; use Arc<T> with a guard or id",
            )
            .with_span(&field.ty));
        }
        out.parameters
            .push(quote!(::strata::Parameter::optional::<#inner>().named(#name)));
        out.inits
            .push(quote!(#ident: args.take_optional::<#inner>(#position)?));
    } else {
        return Err(darling::Error::custom(
            "field must be Arc<T>, Option<Arc<T>>, a ContainerHandle, or #[inject(default)]",
        )
        .with_span(&field.ty));
    }

    *index += 1;
    Ok(())
}

fn last_segment(ty: &Type) -> Option<&syn::PathSegment> {
    match ty {
        Type::Path(type_path) if type_path.qself.is_none() => type_path.path.segments.last(),
        _ => None,
    }
}

/// Extract `T` from `Wrapper<T>` when the last path segment is `wrapper`.
fn generic_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let segment = last_segment(ty)?;
    if segment.ident != wrapper {
        return None;
    }
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => match args.args.first() {
            Some(GenericArgument::Type(inner)) => Some(inner),
            _ => None,
        },
        _ => None,
    }
}

fn arc_inner(ty: &Type) -> Option<&Type> {
    generic_inner(ty, "Arc")
}

fn option_inner(ty: &Type) -> Option<&Type> {
    generic_inner(ty, "Option")
}

fn is_container_handle(ty: &Type) -> bool {
    last_segment(ty).is_some_and(|segment| segment.ident == "ContainerHandle")
}
