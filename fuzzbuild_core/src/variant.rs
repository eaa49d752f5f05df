use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Compiler pair installed by AFL++ for LTO instrumentation.
const AFL_CC: &str = "afl-clang-lto";
const AFL_CXX: &str = "afl-clang-lto++";
/// afl-clang-lto cannot link without being pointed at lld.
const AFL_LINKER: (&str, &str) = ("AFL_REAL_LD", "ld.lld");
const AFL_CMPLOG: (&str, &str) = ("AFL_LLVM_CMPLOG", "1");

const HONGGFUZZ_CC: &str = "hfuzz-clang";
const HONGGFUZZ_CXX: &str = "hfuzz-clang++";

const PROFILE_ABS_PATH: &str = "-fprofile-abs-path";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unknown build variant '{0}'")]
    UnknownVariant(String),
}

/// Codegen optimization level, spelled the way the configure tool takes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationLevel {
    Plain,
    O0,
    Og,
    O1,
    O2,
    O3,
    Os,
}

impl OptimizationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationLevel::Plain => "plain",
            OptimizationLevel::O0 => "0",
            OptimizationLevel::Og => "g",
            OptimizationLevel::O1 => "1",
            OptimizationLevel::O2 => "2",
            OptimizationLevel::O3 => "3",
            OptimizationLevel::Os => "s",
        }
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instrumented build configuration.
///
/// `None` compilers mean "whatever `CC`/`CXX` the ambient environment selects".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildVariant {
    pub name: String,
    pub output_directory: PathBuf,
    pub compiler_c: Option<String>,
    pub compiler_cxx: Option<String>,
    pub optimization_level: OptimizationLevel,
    pub extra_c_flags: Vec<String>,
    pub extra_cxx_flags: Vec<String>,
    pub extra_configure_flags: Vec<String>,
    /// Ordered so later entries win on duplicate keys.
    pub extra_env: Vec<(String, String)>,
}

/// Static row of the catalog table. Converted into an owned `BuildVariant`
/// on every `list_variants` call so no two variants share flag storage.
struct VariantRecord {
    name: &'static str,
    output_directory: &'static str,
    compilers: Option<(&'static str, &'static str)>,
    optimization_level: OptimizationLevel,
    extra_c_flags: &'static [&'static str],
    extra_cxx_flags: &'static [&'static str],
    extra_configure_flags: &'static [&'static str],
    extra_env: &'static [(&'static str, &'static str)],
}

impl VariantRecord {
    fn to_variant(&self) -> BuildVariant {
        let owned = |flags: &[&str]| flags.iter().map(|f| f.to_string()).collect::<Vec<_>>();
        BuildVariant {
            name: self.name.to_string(),
            output_directory: PathBuf::from(self.output_directory),
            compiler_c: self.compilers.map(|(cc, _)| cc.to_string()),
            compiler_cxx: self.compilers.map(|(_, cxx)| cxx.to_string()),
            optimization_level: self.optimization_level,
            extra_c_flags: owned(self.extra_c_flags),
            extra_cxx_flags: owned(self.extra_cxx_flags),
            extra_configure_flags: owned(self.extra_configure_flags),
            extra_env: self
                .extra_env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

// Build order: coverage baseline, AFL++ (normal, ASan, cmplog), honggfuzz.
const CATALOG: [VariantRecord; 5] = [
    // -O0 with gcov instrumentation, for measuring campaign coverage.
    VariantRecord {
        name: "coverage",
        output_directory: "bnoopt",
        compilers: None,
        optimization_level: OptimizationLevel::O0,
        extra_c_flags: &[PROFILE_ABS_PATH],
        extra_cxx_flags: &[PROFILE_ABS_PATH],
        extra_configure_flags: &["-Db_coverage=true"],
        extra_env: &[],
    },
    VariantRecord {
        name: "afl",
        output_directory: "bfuzz",
        compilers: Some((AFL_CC, AFL_CXX)),
        optimization_level: OptimizationLevel::O3,
        extra_c_flags: &[],
        extra_cxx_flags: &[],
        extra_configure_flags: &[],
        extra_env: &[AFL_LINKER],
    },
    VariantRecord {
        name: "afl-asan",
        output_directory: "bfuzzasan",
        compilers: Some((AFL_CC, AFL_CXX)),
        optimization_level: OptimizationLevel::O3,
        extra_c_flags: &[],
        extra_cxx_flags: &[],
        extra_configure_flags: &["-Db_sanitize=address"],
        extra_env: &[AFL_LINKER],
    },
    VariantRecord {
        name: "afl-cmplog",
        output_directory: "bcmplog",
        compilers: Some((AFL_CC, AFL_CXX)),
        optimization_level: OptimizationLevel::O3,
        extra_c_flags: &[],
        extra_cxx_flags: &[],
        extra_configure_flags: &[],
        extra_env: &[AFL_CMPLOG, AFL_LINKER],
    },
    VariantRecord {
        name: "honggfuzz",
        output_directory: "bhf",
        compilers: Some((HONGGFUZZ_CC, HONGGFUZZ_CXX)),
        optimization_level: OptimizationLevel::O3,
        extra_c_flags: &[],
        extra_cxx_flags: &[],
        extra_configure_flags: &[],
        extra_env: &[],
    },
];

/// Every supported variant, in build order.
pub fn list_variants() -> Vec<BuildVariant> {
    CATALOG.iter().map(VariantRecord::to_variant).collect()
}

/// Picks the named variants out of the catalog.
///
/// The result is always in catalog order, whatever order `names` come in.
/// Duplicate names select the variant once. An empty selection means all.
pub fn select_variants<S: AsRef<str>>(names: &[S]) -> Result<Vec<BuildVariant>, CatalogError> {
    let catalog = list_variants();
    if names.is_empty() {
        return Ok(catalog);
    }
    for name in names {
        let name = name.as_ref();
        if !catalog.iter().any(|v| v.name == name) {
            return Err(CatalogError::UnknownVariant(name.to_string()));
        }
    }
    Ok(catalog
        .into_iter()
        .filter(|v| names.iter().any(|n| n.as_ref() == v.name))
        .collect())
}
