//! Transform orchestration
//!
//! A [`Transform`] is a black-box, pre-compiled tree transformation applied to
//! one or more input streams. Compiling is expensive, so descriptors are built
//! once per provider type and shared through a [`TransformCache`]. The
//! [`Transformer`] assembles the argument working set, augments it with the
//! message context when the transform asks for one, runs the transform and
//! hands back its output as a rewound, replayable buffer.

use crate::cache::ReadThroughCache;
use crate::error::{Result, SluiceError};
use crate::io::{CompositeXmlStream, SpillBuffer, Stream};
use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, OnceLock};

/// Argument name under which the message context travels to the transform.
pub const MESSAGE_CONTEXT_EXTENSION: &str = "message-context";

/// Input handed to a [`Transform`]: one document or several.
pub enum TransformInput<'a> {
    /// A single document stream.
    Single(&'a mut dyn Stream),
    /// Several document streams forming one compound input.
    Compound(&'a mut [Box<dyn Stream>]),
}

/// A compiled, reusable tree transformation.
pub trait Transform: Send + Sync {
    /// Apply the transformation, writing the result to `output`.
    fn apply(
        &self,
        input: TransformInput<'_>,
        arguments: &TransformArguments,
        output: &mut dyn Write,
    ) -> Result<()>;
}

/// Named string parameters plus opaque extension objects.
#[derive(Clone, Default)]
pub struct TransformArguments {
    params: BTreeMap<String, String>,
    extensions: BTreeMap<String, Arc<dyn Any + Send + Sync>>,
}

impl TransformArguments {
    /// No parameters, no extensions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a named string parameter.
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
    }

    /// Look up a named string parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Attach an opaque extension object.
    pub fn set_extension(&mut self, name: impl Into<String>, value: Arc<dyn Any + Send + Sync>) {
        self.extensions.insert(name.into(), value);
    }

    /// Look up an extension object.
    pub fn extension(&self, name: &str) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.extensions.get(name)
    }

    /// Whether no parameter and no extension is set.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.extensions.is_empty()
    }

    /// Merge `caller` over `self`: caller-supplied entries win.
    pub fn union(&self, caller: &TransformArguments) -> TransformArguments {
        let mut merged = self.clone();
        for (name, value) in &caller.params {
            merged.params.insert(name.clone(), value.clone());
        }
        for (name, value) in &caller.extensions {
            merged.extensions.insert(name.clone(), Arc::clone(value));
        }
        merged
    }
}

/// What a transform needs beyond its explicit arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionRequirements {
    /// The transform reads message-context properties while executing.
    pub message_context: bool,
}

/// Message promoted-property bag made available to context-aware transforms.
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    properties: BTreeMap<String, String>,
}

impl MessageContext {
    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a context property.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Read a context property.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

/// Everything known about a compiled transform: the transform itself, its
/// default arguments, its extension requirements and the namespace prefixes
/// its expressions rely on.
pub struct TransformDescriptor {
    transform: Arc<dyn Transform>,
    default_arguments: Arc<TransformArguments>,
    requirements: ExtensionRequirements,
    namespaces: BTreeMap<String, String>,
}

impl TransformDescriptor {
    /// Describe `transform` with empty defaults and no requirements.
    pub fn new(transform: Arc<dyn Transform>) -> Self {
        Self {
            transform,
            default_arguments: Arc::new(TransformArguments::new()),
            requirements: ExtensionRequirements::default(),
            namespaces: BTreeMap::new(),
        }
    }

    /// Attach default arguments applied to every execution.
    pub fn with_default_arguments(mut self, arguments: TransformArguments) -> Self {
        self.default_arguments = Arc::new(arguments);
        self
    }

    /// Declare the transform's extension requirements.
    pub fn with_requirements(mut self, requirements: ExtensionRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    /// Register a namespace prefix used by the transform's expressions.
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    /// The compiled transform.
    pub fn transform(&self) -> &Arc<dyn Transform> {
        &self.transform
    }

    /// The shared default arguments.
    pub fn default_arguments(&self) -> &Arc<TransformArguments> {
        &self.default_arguments
    }

    /// The extension requirements.
    pub fn requirements(&self) -> ExtensionRequirements {
        self.requirements
    }

    /// The registered namespace prefixes.
    pub fn namespaces(&self) -> &BTreeMap<String, String> {
        &self.namespaces
    }
}

/// A logical transform type whose descriptor is built once and cached.
pub trait TransformProvider: 'static {
    /// Build the descriptor. Called at most once per provider type and cache.
    fn descriptor() -> TransformDescriptor;
}

/// Process-wide cache of [`TransformDescriptor`]s keyed by provider type.
pub struct TransformCache {
    inner: ReadThroughCache<TypeId, TransformDescriptor>,
}

impl TransformCache {
    /// Fresh, empty cache, mainly for tests.
    pub fn new() -> Self {
        Self {
            inner: ReadThroughCache::new(),
        }
    }

    /// The process-wide descriptor cache.
    pub fn global() -> &'static TransformCache {
        static GLOBAL: OnceLock<TransformCache> = OnceLock::new();
        GLOBAL.get_or_init(TransformCache::new)
    }

    /// Descriptor of `P`, building it on first use.
    pub fn descriptor_of<P: TransformProvider>(&self) -> Result<Arc<TransformDescriptor>> {
        self.inner
            .get_or_compile(&TypeId::of::<P>(), || Ok(P::descriptor()))
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no descriptor has been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for TransformCache {
    fn default() -> Self {
        Self::new()
    }
}

/// What the caller hands to a [`Transformer`].
pub enum TransformerInput {
    /// One document stream.
    Single(Box<dyn Stream>),
    /// Several document streams.
    Compound(Vec<Box<dyn Stream>>),
    /// A synthetic aggregate; unwrapped into its parts when still unread so
    /// the transform sees the original documents rather than re-parsing the
    /// aggregated markup.
    Aggregate(CompositeXmlStream),
}

/// Runs transforms against input streams.
pub struct Transformer<'a> {
    inputs: Vec<Box<dyn Stream>>,
    context: Option<MessageContext>,
    cache: &'a TransformCache,
}

impl<'a> Transformer<'a> {
    /// Build a transformer over `input`, using the process-wide descriptor
    /// cache. At least one stream is required.
    pub fn new(input: TransformerInput) -> Result<Transformer<'static>> {
        Transformer::with_cache(input, TransformCache::global())
    }

    /// Like [`Transformer::new`] with an explicit descriptor cache.
    pub fn with_cache(input: TransformerInput, cache: &'a TransformCache) -> Result<Self> {
        let inputs = match input {
            TransformerInput::Single(stream) => vec![stream],
            TransformerInput::Compound(streams) => streams,
            TransformerInput::Aggregate(composite) => {
                if composite.at_start() {
                    composite.into_parts()?
                } else {
                    vec![Box::new(composite) as Box<dyn Stream>]
                }
            }
        };
        if inputs.is_empty() {
            return Err(SluiceError::InvalidArgument(
                "a transform requires at least one input stream".to_owned(),
            ));
        }
        Ok(Self {
            inputs,
            context: None,
            cache,
        })
    }

    /// Attach the message context offered to context-aware transforms.
    pub fn with_context(mut self, context: MessageContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Apply `P`'s transform with `arguments`, returning its output as a
    /// buffer rewound to the start.
    pub fn apply<P: TransformProvider>(
        &mut self,
        arguments: &TransformArguments,
    ) -> Result<SpillBuffer> {
        let descriptor = self.cache.descriptor_of::<P>()?;
        let working = self.working_arguments(&descriptor, arguments)?;
        let mut output = SpillBuffer::new();
        let input = match self.inputs.as_mut_slice() {
            [single] => TransformInput::Single(single.as_mut()),
            many => TransformInput::Compound(many),
        };
        descriptor.transform().apply(input, &working, &mut output)?;
        output.rewind_to_start()?;
        Ok(output)
    }

    /// The defaults are shared untouched unless the caller supplied arguments
    /// or the transform wants the message context; either forces a private
    /// working copy, and the context object is always freshly built so it is
    /// never shared across executions.
    fn working_arguments(
        &self,
        descriptor: &TransformDescriptor,
        caller: &TransformArguments,
    ) -> Result<Arc<TransformArguments>> {
        let needs_context = descriptor.requirements().message_context;
        if !needs_context && caller.is_empty() {
            return Ok(Arc::clone(descriptor.default_arguments()));
        }
        let mut working = descriptor.default_arguments().union(caller);
        if needs_context {
            let context = self.context.clone().ok_or_else(|| {
                SluiceError::InvalidArgument(
                    "transform requires a message context but none was supplied".to_owned(),
                )
            })?;
            working.set_extension(MESSAGE_CONTEXT_EXTENSION, Arc::new(context));
        }
        Ok(Arc::new(working))
    }
}
