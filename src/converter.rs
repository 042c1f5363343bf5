//! Conversion from fetched or cached values to the requested output type
//!
//! Converters are registered per source type. The registry is checked when a
//! request is built, so a missing converter is a build error rather than a
//! surprise at delivery time.

use crate::error::{LiveboxError, LiveboxResult};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;

/// Maps a `T` into the output type. `None` means the converter could not
/// produce a value, which fails the request.
pub trait Converter<T, O>: Send + Sync {
    fn convert(&self, value: T) -> Option<O>;
}

impl<T, O, F> Converter<T, O> for F
where
    F: Fn(T) -> Option<O> + Send + Sync,
{
    fn convert(&self, value: T) -> Option<O> {
        self(value)
    }
}

/// Type-erased value on its way to the caller
pub(crate) struct Payload {
    type_id: TypeId,
    type_name: &'static str,
    value: Box<dyn Any + Send>,
}

impl Payload {
    pub(crate) fn new<T: Send + 'static>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            value: Box::new(value),
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }
}

trait ErasedConverter<O>: Send + Sync {
    /// `None` if the value is not of the registered type
    fn convert_any(&self, value: Box<dyn Any + Send>) -> Option<Option<O>>;
}

struct Typed<T, C> {
    converter: C,
    _marker: PhantomData<fn(T)>,
}

impl<T, O, C> ErasedConverter<O> for Typed<T, C>
where
    T: 'static,
    C: Converter<T, O>,
{
    fn convert_any(&self, value: Box<dyn Any + Send>) -> Option<Option<O>> {
        let value = value.downcast::<T>().ok()?;
        Some(self.converter.convert(*value))
    }
}

/// Converters keyed by source type
pub(crate) struct ConverterRegistry<O> {
    converters: HashMap<TypeId, (&'static str, Box<dyn ErasedConverter<O>>)>,
}

impl<O: 'static> ConverterRegistry<O> {
    pub(crate) fn new() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Register a converter for `T`, replacing any earlier one
    pub(crate) fn insert<T, C>(&mut self, converter: C)
    where
        T: 'static,
        C: Converter<T, O> + 'static,
    {
        let typed = Typed {
            converter,
            _marker: PhantomData::<fn(T)>,
        };
        self.converters
            .insert(TypeId::of::<T>(), (type_name::<T>(), Box::new(typed)));
    }

    /// Whether a value of `type_id` can reach the output type
    pub(crate) fn supports(&self, type_id: TypeId) -> bool {
        type_id == TypeId::of::<O>() || self.converters.contains_key(&type_id)
    }

    /// Fail-fast check used at build time
    pub(crate) fn ensure_supported(&self, type_id: TypeId, name: &str) -> LiveboxResult<()> {
        if self.supports(type_id) {
            return Ok(());
        }
        Err(LiveboxError::Configuration(format!(
            "no converter registered for {} and it is not the output type {}",
            name,
            type_name::<O>()
        )))
    }

    pub(crate) fn registered(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.converters.values().map(|(name, _)| *name)
    }

    /// Convert a payload, preferring a registered converter over a direct cast
    pub(crate) fn convert(&self, key: &str, payload: Payload) -> LiveboxResult<O> {
        let Payload {
            type_id,
            type_name,
            value,
        } = payload;

        if let Some((_, converter)) = self.converters.get(&type_id) {
            return match converter.convert_any(value) {
                Some(Some(output)) => Ok(output),
                Some(None) => Err(LiveboxError::Converter {
                    key: key.to_string(),
                    type_name,
                }),
                None => Err(LiveboxError::Internal(format!(
                    "converter registered for {type_name} rejected its own type"
                ))),
            };
        }

        value.downcast::<O>().map(|output| *output).map_err(|_| {
            LiveboxError::Configuration(format!(
                "no converter registered for {} and it is not the output type {}",
                type_name,
                std::any::type_name::<O>()
            ))
        })
    }
}
