//! Chorus Core - Entity Types
//!
//! Data structures shared by every other crate: identifiers, the clock
//! abstraction, entity records, the error taxonomy and configuration.
//! No I/O beyond reading the configuration file.

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;

pub use config::{BackendConfig, CacheSettings, ChorusConfig, LlmSettings, TimeoutSettings, MAX_MAP_SIZE_MB};
pub use entities::{
    AiProvider, AiProviderDraft, AiProviderPatch, Client, ClientDraft, ClientPatch, Entity,
    Keyword, KeywordDraft, KeywordPatch, Organization, Profile, ProfileBundle, SampleComment,
    SampleCommentDraft, SampleCommentPatch, Session, SessionUser,
};
pub use enums::{EntityKind, MutationKind, Platform, ProviderKind};
pub use error::{
    AuthError, CacheIoError, ChorusError, ChorusResult, ConfigError, LlmError,
    RemoteFetchError, RemoteMutationError, TemplateError, TimeoutError, ValidationError,
};
pub use identity::{
    Clock, EntityKey, EpochMillis, FixedClock, ManualClock, SystemClock, Timestamp,
};
