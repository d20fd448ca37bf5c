use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use toml_edit::{Document, Item, Table};

/// The caller's `Cargo.toml`, used to find how generated code can name
/// another crate of this workspace.
///
/// # Example
///
/// ```rust
/// # use vc_macro_utils::Manifest;
/// let p: syn::Path = Manifest::shared(|m| m.get_crate_path("vc_persist"));
/// ```
///
/// # Resolution rules
///
/// 1. A crate listed in `dependencies` is named `::crate_name`.
/// 2. A `vc_*` crate reached through the `vc_archive` facade is named
///    `::vc_archive::short_name` (e.g. `vc_persist` -> `::vc_archive::persist`).
/// 3. Steps 1 and 2 are repeated for `dev-dependencies`.
/// 4. Anything else falls back to `::crate_name`.
///
/// A crate naming itself should declare `extern crate self as crate_name;`
/// so that the absolute path also resolves inside the crate.
#[derive(Debug)]
pub struct Manifest {
    pub manifest: Document<Box<str>>,
    pub modified_time: SystemTime,
}

const FACADE_NAME: &str = "vc_archive";
const CRATE_PREFIX: &str = "vc_";

impl Manifest {
    #[inline(never)]
    fn manifest_path() -> PathBuf {
        let dir = env::var_os("CARGO_MANIFEST_DIR")
            .expect("CARGO_MANIFEST_DIR should be set by cargo.");
        let path = PathBuf::from(dir).join("Cargo.toml");
        assert!(path.exists(), "no Cargo manifest at {}", path.display());
        path
    }

    #[inline(never)]
    fn modified_time(path: &Path) -> std::io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    #[inline(never)]
    fn parse_manifest(path: &Path) -> Document<Box<str>> {
        let text = std::fs::read_to_string(path)
            .unwrap_or_else(|_| panic!("cannot read cargo manifest {}", path.display()));
        Document::parse(text.into_boxed_str())
            .unwrap_or_else(|_| panic!("cannot parse cargo manifest {}", path.display()))
    }

    fn absolute(segments: &[&str]) -> syn::Path {
        syn::parse_str(&format!("::{}", segments.join("::")))
            .expect("crate names are valid paths")
    }

    fn lookup(deps: &Table, name: &str) -> Option<syn::Path> {
        if deps.contains_key(name) {
            return Some(Self::absolute(&[name]));
        }
        let short = name.strip_prefix(CRATE_PREFIX)?;
        deps.contains_key(FACADE_NAME)
            .then(|| Self::absolute(&[FACADE_NAME, short]))
    }

    /// Returns the path under which `name` is reachable from the calling crate.
    #[inline(never)]
    pub fn get_crate_path(&self, name: &str) -> syn::Path {
        ["dependencies", "dev-dependencies"]
            .into_iter()
            .filter_map(|table| match self.manifest.get(table) {
                Some(Item::Table(deps)) => Self::lookup(deps, name),
                _ => None,
            })
            .next()
            .unwrap_or_else(|| Self::absolute(&[name]))
    }

    /// Runs `func` with the caller's manifest.
    ///
    /// Manifests are cached per path and re-read only when the file changed,
    /// still callers should resolve paths once per macro invocation.
    pub fn shared<R>(func: impl FnOnce(&Self) -> R) -> R {
        static MANIFESTS: RwLock<BTreeMap<PathBuf, Manifest>> = RwLock::new(BTreeMap::new());

        let path = Self::manifest_path();
        let modified_time =
            Self::modified_time(&path).expect("the Cargo.toml should have a modified time");

        {
            let manifests = MANIFESTS.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(manifest) = manifests.get(&path)
                && manifest.modified_time == modified_time
            {
                return func(manifest);
            }
        }

        let manifest = Manifest {
            manifest: Self::parse_manifest(&path),
            modified_time,
        };
        let result = func(&manifest);

        MANIFESTS
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, manifest);

        result
    }
}
