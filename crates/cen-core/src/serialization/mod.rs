//! Identity-preserving serialization of the object graph.
//!
//! Registered objects — nodes, contexts and the network root — each own one
//! document file named after their serialization id. Cross-document links are
//! `@id` references resolved through the [`Serializer`]'s registry, which
//! keeps id and object in a strict bijection; everything else (edges,
//! interactions, payloads) is inlined as composite documents.
//!
//! Instead of the reflection walk of the original system, each registered
//! entity implements the [`Persistent`] codec explicitly. Partial reload is
//! depth-bounded: depth 0 updates only the target object, depth 1 also
//! materializes the objects it references, and so on.

pub mod document;
mod persistent;
mod serializer;

pub use persistent::{AnyRef, Decoder, Encoder, Persistent};
pub use serializer::Serializer;
