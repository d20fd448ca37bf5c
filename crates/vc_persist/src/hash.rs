//! Hash containers shared by the caches and tables of this crate.

use foldhash::fast::FixedState;

pub(crate) type HashMap<K, V> = hashbrown::HashMap<K, V, FixedState>;
pub(crate) type HashSet<K> = hashbrown::HashSet<K, FixedState>;
