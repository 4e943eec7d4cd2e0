//! RAII guard for pooled resources

use crate::factory::Factory;
use crate::pool::Pool;

/// A checked-out resource that goes back to its pool when dropped.
///
/// Returned by [`Pool::get`]. Use [`into_inner`](Pooled::into_inner) to take
/// the resource out; it then stays checked out until passed to
/// [`Pool::release`].
pub struct Pooled<F: Factory> {
    resource: Option<F::Resource>,
    pool: Pool<F>,
}

impl<F: Factory> Pooled<F> {
    pub(crate) fn new(resource: F::Resource, pool: Pool<F>) -> Self {
        Self {
            resource: Some(resource),
            pool,
        }
    }

    /// The pool this resource belongs to.
    #[must_use]
    pub fn pool(&self) -> &Pool<F> {
        &self.pool
    }

    /// Take the resource out of the guard without releasing it.
    #[must_use]
    pub fn into_inner(mut self) -> F::Resource {
        self.resource.take().expect("guard used after into_inner")
    }
}

impl<F: Factory> std::ops::Deref for Pooled<F> {
    type Target = F::Resource;

    fn deref(&self) -> &F::Resource {
        self.resource.as_ref().expect("guard used after into_inner")
    }
}

impl<F: Factory> std::ops::DerefMut for Pooled<F> {
    fn deref_mut(&mut self) -> &mut F::Resource {
        self.resource.as_mut().expect("guard used after into_inner")
    }
}

impl<F: Factory> Drop for Pooled<F> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.release_detached(resource);
        }
    }
}

impl<F: Factory> std::fmt::Debug for Pooled<F>
where
    F::Resource: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pooled")
            .field("resource", &self.resource)
            .finish()
    }
}
