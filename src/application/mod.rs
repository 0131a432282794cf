//! Application services: the stale-while-revalidate repositories and the
//! collaborator traits they are built on.

pub mod error;
pub mod posts;
pub mod repos;
pub mod revalidation;
pub(crate) mod sync;
pub mod terms;
