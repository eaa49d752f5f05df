use crate::variant::BuildVariant;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

/// Always applied on top of the ambient environment.
///
/// meson picks up `ccache cc` when ccache is installed, and ccache drops
/// `-fprofile-arcs`, which silently breaks coverage builds (ccache #1531).
pub const ALWAYS_ON_OVERRIDES: &[(&str, &str)] = &[("CCACHE_DISABLE", "1")];

pub const CC_VAR: &str = "CC";
pub const CXX_VAR: &str = "CXX";
pub const CFLAGS_VAR: &str = "CFLAGS";
pub const CXXFLAGS_VAR: &str = "CXXFLAGS";

/// The full environment a variant's child processes run with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<OsString, OsString>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment.
    pub fn ambient() -> Self {
        std::env::vars_os().collect()
    }

    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.vars.get(key.as_ref()).map(OsString::as_os_str)
    }

    pub fn contains(&self, key: impl AsRef<OsStr>) -> bool {
        self.vars.contains_key(key.as_ref())
    }

    pub fn set(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Writes every pair over the current contents; later pairs win.
    pub fn layer<K, V, It>(&mut self, overrides: It)
    where
        K: Into<OsString>,
        V: Into<OsString>,
        It: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in overrides {
            self.set(k, v);
        }
    }

    /// Appends space-separated flags to `key`, keeping whatever was there.
    pub fn append_flags(&mut self, key: &str, flags: &[String]) {
        if flags.is_empty() {
            return;
        }
        let mut value = self.get(key).map(OsStr::to_os_string).unwrap_or_default();
        for flag in flags {
            if !value.is_empty() {
                value.push(" ");
            }
            value.push(flag);
        }
        self.set(key, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    /// Entries that are new or changed relative to `base`.
    pub fn overrides_against(&self, base: &Environment) -> BTreeMap<String, String> {
        self.vars
            .iter()
            .filter(|(k, v)| base.vars.get(*k) != Some(*v))
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect()
    }
}

impl<K: Into<OsString>, V: Into<OsString>> FromIterator<(K, V)> for Environment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut env = Environment::new();
        env.layer(iter);
        env
    }
}

/// Builds a variant's environment.
///
/// Layers apply in order: `ambient`, then [`ALWAYS_ON_OVERRIDES`], then the
/// variant's `extra_env`. Keys in [`ALWAYS_ON_OVERRIDES`] are re-asserted
/// afterwards, so no variant can switch the build cache back on. Compiler
/// overrides are injected as `CC`/`CXX` only when the variant sets them, and
/// extra compiler flags are appended to `CFLAGS`/`CXXFLAGS`.
pub fn compose_environment(ambient: &Environment, variant: &BuildVariant) -> Environment {
    let mut env = ambient.clone();
    env.layer(ALWAYS_ON_OVERRIDES.iter().copied());
    env.layer(variant.extra_env.iter().cloned());
    env.layer(ALWAYS_ON_OVERRIDES.iter().copied());

    if let Some(cc) = &variant.compiler_c {
        env.set(CC_VAR, cc);
    }
    if let Some(cxx) = &variant.compiler_cxx {
        env.set(CXX_VAR, cxx);
    }

    env.append_flags(CFLAGS_VAR, &variant.extra_c_flags);
    env.append_flags(CXXFLAGS_VAR, &variant.extra_cxx_flags);
    env
}
