//! Parent-pointer trees (locations, factions, lores, events)

use uuid::Uuid;

/// Upper bound on the depth walked by recursive traversals
///
/// Cycles are not prevented by the schema; traversals stop at this depth
/// instead of looping forever.
pub const MAX_HIERARCHY_DEPTH: i32 = 256;

/// A node in a same-kind parent-pointer tree
///
/// `hierarchy_level` caches the length of the path to the root: roots sit at
/// level 0 and a child sits one level below its parent.
pub trait Hierarchical {
    /// Resource name used in errors and logs
    const RESOURCE: &'static str;

    /// Node id
    fn id(&self) -> Uuid;
    /// Owning tenant
    fn tenant_id(&self) -> Uuid;
    /// Parent node, if any
    fn parent_id(&self) -> Option<Uuid>;
    /// Cached depth
    fn hierarchy_level(&self) -> i32;
    /// Overwrite the parent pointer
    fn set_parent_id(&mut self, parent_id: Option<Uuid>);
    /// Overwrite the cached depth
    fn set_hierarchy_level(&mut self, level: i32);

    /// Attach under `parent` (or make a root) and recompute the level
    fn attach_to(&mut self, parent: Option<&Self>) {
        match parent {
            Some(p) => {
                self.set_parent_id(Some(p.id()));
                self.set_hierarchy_level(p.hierarchy_level() + 1);
            }
            None => {
                self.set_parent_id(None);
                self.set_hierarchy_level(0);
            }
        }
    }
}

macro_rules! impl_hierarchical {
    ($ty:ty, $resource:literal) => {
        impl $crate::world::hierarchy::Hierarchical for $ty {
            const RESOURCE: &'static str = $resource;

            fn id(&self) -> uuid::Uuid {
                self.id
            }

            fn tenant_id(&self) -> uuid::Uuid {
                self.tenant_id
            }

            fn parent_id(&self) -> Option<uuid::Uuid> {
                self.parent_id
            }

            fn hierarchy_level(&self) -> i32 {
                self.hierarchy_level
            }

            fn set_parent_id(&mut self, parent_id: Option<uuid::Uuid>) {
                self.parent_id = parent_id;
            }

            fn set_hierarchy_level(&mut self, level: i32) {
                self.hierarchy_level = level;
            }
        }
    };
}

pub(crate) use impl_hierarchical;
