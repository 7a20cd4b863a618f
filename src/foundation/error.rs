use crate::replay::engine::ReplayIssue;

/// Result alias used across the crate.
pub type RecipeResult<T> = Result<T, RecipeError>;

/// Error type for recording, loading, decoding and replaying recipes.
#[derive(thiserror::Error, Debug)]
pub enum RecipeError {
    /// No recipe document could be located in the given source.
    #[error("recipe not found: {0}")]
    RecipeNotFound(String),

    /// More than one candidate document and none of them is canonical.
    #[error("ambiguous recipe: {0}")]
    AmbiguousRecipe(String),

    /// The document declares a schema major version this build cannot read.
    #[error("unsupported schema version '{found}' (this build reads major version {supported})")]
    UnsupportedVersion {
        /// Version string found in the document.
        found: String,
        /// Supported major version.
        supported: u32,
    },

    /// An external payload file or cached column is absent.
    #[error("missing payload: {0}")]
    MissingPayload(String),

    /// An external payload exists but does not contain the addressed selector.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A cross-call reference points at a call that has not produced a result yet.
    #[error("unresolved reference: call '{0}' has not produced a result")]
    UnresolvedReference(String),

    /// The operation name is not part of the supported operation set.
    #[error("unknown operation: '{0}'")]
    UnknownOperation(String),

    /// An explicit call id collides with an existing record in the same panel.
    #[error("duplicate call id '{id}' in panel {panel}")]
    DuplicateId {
        /// Offending id.
        id: String,
        /// Panel key.
        panel: String,
    },

    /// Decoding one argument of one call failed.
    #[error("argument decode error at {panel}/{call_id} argument '{arg}': {source}")]
    ArgumentDecode {
        /// Panel key.
        panel: String,
        /// Owning call id.
        call_id: String,
        /// Argument name (positional variable name or keyword).
        arg: String,
        /// Underlying codec error.
        #[source]
        source: Box<RecipeError>,
    },

    /// A strict reconstruction finished with one or more fatal issues.
    #[error("reconstruction failed with {} issue(s)", .0.len())]
    Reconstruction(Vec<ReplayIssue>),

    /// Invalid input data or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// The rendering collaborator rejected an operation.
    #[error("engine error: {0}")]
    Engine(String),

    /// Document or payload (de)serialization failed.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped IO or dependency error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RecipeError {
    /// Build a [`RecipeError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`RecipeError::Engine`].
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Build a [`RecipeError::Serde`].
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Build a [`RecipeError::MissingPayload`].
    pub fn missing_payload(msg: impl Into<String>) -> Self {
        Self::MissingPayload(msg.into())
    }

    /// Build a [`RecipeError::SchemaMismatch`].
    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    /// Attach call/argument context to a codec error.
    pub fn in_argument(
        self,
        panel: impl Into<String>,
        call_id: impl Into<String>,
        arg: impl Into<String>,
    ) -> Self {
        Self::ArgumentDecode {
            panel: panel.into(),
            call_id: call_id.into(),
            arg: arg.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, looking through [`RecipeError::ArgumentDecode`] wrappers.
    pub fn root(&self) -> &RecipeError {
        match self {
            Self::ArgumentDecode { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
