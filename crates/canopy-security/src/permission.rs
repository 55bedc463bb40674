//! Permission bits
//!
//! Permissions are the fine grained rights checked on item access. They are
//! derived from privileges during evaluation and never stored directly.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Fine grained access rights on a single item
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Permission: u32 {
        /// No permission at all
        const NONE = 0;

        const READ = 1 << 0;
        const SET_PROPERTY = 1 << 1;
        const ADD_NODE = 1 << 2;
        const REMOVE_NODE = 1 << 3;
        const REMOVE_PROPERTY = 1 << 4;
        /// Read the access control content of a node
        const READ_AC = 1 << 5;
        /// Modify the access control content of a node
        const MODIFY_AC = 1 << 6;
        const NODE_TYPE_MNGMT = 1 << 7;
        const VERSION_MNGMT = 1 << 8;
        const LOCK_MNGMT = 1 << 9;
        const LIFECYCLE_MNGMT = 1 << 10;
        const RETENTION_MNGMT = 1 << 11;

        const ALL = Self::READ.bits()
            | Self::SET_PROPERTY.bits()
            | Self::ADD_NODE.bits()
            | Self::REMOVE_NODE.bits()
            | Self::REMOVE_PROPERTY.bits()
            | Self::READ_AC.bits()
            | Self::MODIFY_AC.bits()
            | Self::NODE_TYPE_MNGMT.bits()
            | Self::VERSION_MNGMT.bits()
            | Self::LOCK_MNGMT.bits()
            | Self::LIFECYCLE_MNGMT.bits()
            | Self::RETENTION_MNGMT.bits();
    }
}

impl Permission {
    /// Bits of `a` that are not in `b`
    pub fn diff(a: Permission, b: Permission) -> Permission {
        a.difference(b)
    }
}

impl Default for Permission {
    fn default() -> Self {
        Permission::NONE
    }
}
