//! Traits implemented by pooled resources and the factories that build them.

use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;

use crate::context::Context;
use crate::error::Result;

/// A resource that can live in a [`Pool`](crate::Pool).
///
/// The identifier is how the pool recognises an instance handed back to
/// [`Pool::release`](crate::Pool::release). It must be assigned at
/// construction, never change, and be unique among the instances a factory
/// produces.
pub trait Poolable: Send + 'static {
    /// Identifier type.
    type Id: Clone + Eq + Hash + Display + Send + Sync + 'static;

    /// The stable identifier of this instance.
    fn id(&self) -> Self::Id;
}

/// Constructs and destroys pooled resources.
///
/// The pool calls [`create`](Factory::create) without holding its lock, so
/// several constructions may run at once; implementations must be stateless
/// or internally synchronized.
pub trait Factory: Send + Sync + 'static {
    /// The resource type produced by this factory.
    type Resource: Poolable;

    /// Build a new resource. May be slow; the pool bounds it by the
    /// acquisition deadline and the caller's cancellation token.
    fn create(&self, ctx: &Context) -> impl Future<Output = Result<Self::Resource>> + Send;

    /// Permanently dispose of a resource evicted from the pool.
    ///
    /// Failures are recorded by the pool and never surface to callers.
    fn destroy(&self, resource: Self::Resource) -> impl Future<Output = Result<()>> + Send {
        drop(resource);
        std::future::ready(Ok(()))
    }
}
