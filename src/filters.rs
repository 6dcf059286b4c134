//! Path classification for changed and related files.
//!
//! Everything here is pure string logic over repository-relative paths. The
//! checks run in a fixed order (generated/cache, env, secrets, lockfiles, docs,
//! tests) and the first matching rule decides the omission reason.

use crate::config::ContextPackOptions;
use crate::domain::OmissionReason;

/// Related test files within this many hops of a changed file count as close.
pub const CLOSE_TEST_MAX_DISTANCE: u32 = 2;

/// Related test files sharing at least this many leading path segments with a
/// changed file count as close.
pub const CLOSE_TEST_SHARED_SEGMENTS: usize = 4;

/// Directory segments that never belong in a pack (matched case-insensitively).
const HARD_EXCLUDED_SEGMENTS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "prompt",
    "dist",
    "build",
    "target",
    "out",
    "coverage",
    ".next",
    ".nuxt",
    ".svelte-kit",
    ".turbo",
    ".cache",
    ".parcel-cache",
    ".venv",
    "venv",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".terraform",
    ".direnv",
    ".gradle",
    ".idea",
];

const LOCKFILE_BASENAMES: &[&str] = &[
    "pnpm-lock.yaml",
    "package-lock.json",
    "yarn.lock",
    "bun.lock",
    "bun.lockb",
    "npm-shrinkwrap.json",
    "Cargo.lock",
    "composer.lock",
    "Gemfile.lock",
    "poetry.lock",
    "Pipfile.lock",
    ".terraform.lock.hcl",
];

const SECRET_DOTFILES: &[&str] = &[".npmrc", ".pypirc", ".netrc"];

const SECRET_PATH_SUFFIXES: &[&str] = &["/.aws/credentials", "/.aws/config", "/.gem/credentials"];

const SECRET_BASENAMES: &[&str] = &[
    "id_rsa",
    "id_dsa",
    "id_ecdsa",
    "id_ed25519",
    "google-services.json",
    "googleservice-info.plist",
];

const SECRET_EXTENSIONS: &[&str] = &[
    ".pem",
    ".key",
    ".p12",
    ".pfx",
    ".jks",
    ".keystore",
    ".kdbx",
    ".pkcs12",
    ".der",
    ".crt",
    ".cer",
    ".csr",
    ".mobileprovision",
    ".provisionprofile",
];

const DOCS_SEGMENTS: &[&str] = &["docs", "doc", "documentation"];

const TEST_SEGMENTS: &[&str] = &["__tests__", "test", "tests"];

const TEST_DATA_SEGMENTS: &[&str] = &["test_data", "test-data", "testdata"];

/// Source and config extensions a reviewer is expected to read.
const RECOGNIZED_EXTENSIONS: &[&str] = &[
    ".rs", ".zig", ".c", ".h", ".cpp", ".hpp", ".cc", ".hh", ".m", ".mm", ".swift", ".kt",
    ".kts", ".java", ".py", ".go", ".rb", ".php", ".cs", ".fs", ".lua", ".r", ".ts", ".tsx",
    ".js", ".jsx", ".mjs", ".cjs", ".svelte", ".vue", ".css", ".scss", ".sass", ".less",
    ".html", ".htm", ".svg", ".xml", ".xsd", ".xsl", ".json", ".jsonc", ".toml", ".yaml",
    ".yml", ".ini", ".cfg", ".conf", ".properties", ".md", ".mdx", ".rst", ".txt", ".sh",
    ".bash", ".zsh", ".fish", ".ps1", ".sql", ".graphql", ".gql", ".proto", ".tf", ".tfvars",
    ".cmake", ".gradle",
];

/// Extensionless build and tooling files that are still worth reading.
const RECOGNIZED_BASENAMES: &[&str] = &[
    "Dockerfile",
    "Containerfile",
    "Makefile",
    "GNUmakefile",
    "justfile",
    "Justfile",
    "Procfile",
    "Brewfile",
    "Gemfile",
    "Rakefile",
    "Vagrantfile",
    "CMakeLists.txt",
    "meson.build",
    "meson_options.txt",
    "BUILD",
    "BUILD.bazel",
    "WORKSPACE",
    "WORKSPACE.bazel",
    "MODULE.bazel",
    "Jenkinsfile",
    "Tiltfile",
    "Podfile",
    "Cartfile",
    "Fastfile",
    "flake.nix",
    "default.nix",
    "shell.nix",
    "Taskfile",
    ".editorconfig",
    ".gitignore",
    ".gitattributes",
    ".dockerignore",
    ".npmrc",
    ".nvmrc",
    ".prettierignore",
    ".prettierrc",
    ".eslintignore",
    ".tool-versions",
    ".python-version",
    ".ruby-version",
    ".node-version",
    ".terraform.lock.hcl",
    "google-services.json",
    "GoogleService-Info.plist",
];

/// Outcome of classifying one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDecision {
    pub include: bool,
    pub reason: Option<OmissionReason>,
}

impl FilterDecision {
    pub fn included() -> Self {
        Self {
            include: true,
            reason: None,
        }
    }

    pub fn omitted(reason: OmissionReason) -> Self {
        Self {
            include: false,
            reason: Some(reason),
        }
    }

    /// The recorded omission reason, `filtered:unknown` if none was given.
    pub fn omission_reason(&self) -> OmissionReason {
        self.reason.unwrap_or(OmissionReason::Unknown)
    }
}

/// Which side of the pack a path is being considered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRole {
    /// Touched by the change; docs and tests are always kept.
    Changed,
    /// Recalled as related; docs and tests follow the run options.
    Related,
}

/// Backslashes to `/`, one leading `./` stripped, surrounding whitespace trimmed.
pub fn normalize_path(input: &str) -> String {
    let slashed = input.replace('\\', "/");
    let stripped = slashed.strip_prefix("./").unwrap_or(&slashed);
    stripped.trim().to_string()
}

fn segments(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split('/').filter(|s| !s.is_empty())
}

fn basename(normalized: &str) -> &str {
    segments(normalized).last().unwrap_or(normalized)
}

/// Lower-cased extension of the basename, including the dot.
pub fn file_extension(path: &str) -> String {
    let normalized = normalize_path(path);
    let base = basename(&normalized);
    match base.rfind('.') {
        Some(index) => base[index..].to_lowercase(),
        None => String::new(),
    }
}

/// Non-empty, lower-cased path segments.
pub fn lower_segments(path: &str) -> Vec<String> {
    segments(&normalize_path(path))
        .map(str::to_lowercase)
        .collect()
}

pub fn is_hard_excluded(path: &str) -> bool {
    let normalized = normalize_path(path);

    if segments(&normalized)
        .any(|s| HARD_EXCLUDED_SEGMENTS.contains(&s.to_lowercase().as_str()))
    {
        return true;
    }

    if normalized.contains(".egg-info/") || basename(&normalized) == ".DS_Store" {
        return true;
    }

    let lower = normalized.to_lowercase();
    lower.contains("chatgpt_code_dump") || lower.contains("code-dump")
}

pub fn is_env_path(path: &str) -> bool {
    let normalized = normalize_path(path);
    let base = basename(&normalized);
    base == ".env" || base.starts_with(".env.") || base == ".envrc"
}

pub fn is_secret_path(path: &str) -> bool {
    let normalized = normalize_path(path);
    let base = basename(&normalized).to_lowercase();

    let dotfile = SECRET_DOTFILES
        .iter()
        .any(|name| normalized == *name || normalized.ends_with(&format!("/{}", name)));
    if dotfile || SECRET_PATH_SUFFIXES.iter().any(|s| normalized.ends_with(s)) {
        return true;
    }

    if SECRET_BASENAMES.contains(&base.as_str()) {
        return true;
    }

    if SECRET_EXTENSIONS.iter().any(|ext| base.ends_with(ext)) {
        return true;
    }

    base.contains("service-account") || base.contains("serviceaccount")
}

pub fn is_lockfile(path: &str) -> bool {
    let normalized = normalize_path(path);
    LOCKFILE_BASENAMES.contains(&basename(&normalized))
}

pub fn is_docs_path(path: &str) -> bool {
    lower_segments(path)
        .iter()
        .any(|s| DOCS_SEGMENTS.contains(&s.as_str()))
}

/// Test-shaped path: a test directory segment or a test-style basename.
pub fn is_test_path(path: &str) -> bool {
    let lower = normalize_path(path).to_lowercase();

    if lower.split('/').any(|s| TEST_SEGMENTS.contains(&s)) {
        return true;
    }

    let base = basename(&lower);
    base.contains(".test.") || base.contains(".spec.") || base.contains("_test.") || base.starts_with("test_")
}

pub fn is_test_data_path(path: &str) -> bool {
    lower_segments(path)
        .iter()
        .any(|s| TEST_DATA_SEGMENTS.contains(&s.as_str()))
}

/// Test files and test fixtures; the predicate behind the close-test reserve.
pub fn is_test_like_path(path: &str) -> bool {
    is_test_path(path) || is_test_data_path(path)
}

/// Whether the path has a known source/config extension or build basename.
///
/// Informational only: unrecognized files are still kept, binary probing
/// decides later.
pub fn is_recognized_source(path: &str) -> bool {
    let normalized = normalize_path(path);
    let base = basename(&normalized);

    if RECOGNIZED_BASENAMES.contains(&base)
        || base.starts_with("Procfile.")
        || base.starts_with("Gemfile.")
        || base.starts_with("Rakefile.")
    {
        return true;
    }

    RECOGNIZED_EXTENSIONS.contains(&file_extension(&normalized).as_str())
}

/// Classify a path for the given role.
pub fn classify(path: &str, options: &ContextPackOptions, role: PathRole) -> FilterDecision {
    let (include_docs, include_tests) = match role {
        PathRole::Changed => (true, true),
        PathRole::Related => (options.include_docs, options.include_tests),
    };

    if is_hard_excluded(path) {
        return FilterDecision::omitted(OmissionReason::GeneratedCache);
    }
    if !options.include_env && is_env_path(path) {
        return FilterDecision::omitted(OmissionReason::Env);
    }
    if !options.include_secrets && is_secret_path(path) {
        return FilterDecision::omitted(OmissionReason::Secret);
    }
    if !options.include_lockfiles && is_lockfile(path) {
        return FilterDecision::omitted(OmissionReason::Lockfile);
    }
    if !include_docs && is_docs_path(path) {
        return FilterDecision::omitted(OmissionReason::Docs);
    }
    if !include_tests && is_test_path(path) {
        return FilterDecision::omitted(OmissionReason::Tests);
    }

    FilterDecision::included()
}

pub fn evaluate_changed_file(path: &str, options: &ContextPackOptions) -> FilterDecision {
    classify(path, options, PathRole::Changed)
}

pub fn evaluate_related_file(path: &str, options: &ContextPackOptions) -> FilterDecision {
    classify(path, options, PathRole::Related)
}

fn shared_prefix_len(left: &[String], right: &[String]) -> usize {
    left.iter().zip(right).take_while(|(l, r)| l == r).count()
}

/// Longest leading segment overlap between `path` and any changed path.
pub fn max_shared_prefix_segments(path: &str, changed_segments: &[Vec<String>]) -> usize {
    let candidate = lower_segments(path);
    changed_segments
        .iter()
        .map(|changed| shared_prefix_len(&candidate, changed))
        .max()
        .unwrap_or(0)
}

/// A related test is close when it is few hops away or lives next to a changed file.
pub fn is_close_test_candidate(distance: u32, path: &str, changed_segments: &[Vec<String>]) -> bool {
    distance <= CLOSE_TEST_MAX_DISTANCE
        || max_shared_prefix_segments(path, changed_segments) >= CLOSE_TEST_SHARED_SEGMENTS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ContextPackOptions {
        ContextPackOptions::for_project("/repo")
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./src/a.rs"), "src/a.rs");
        assert_eq!(normalize_path("src\\lib\\b.rs "), "src/lib/b.rs");
        assert_eq!(normalize_path("a.rs"), "a.rs");
    }

    #[test]
    fn test_env_files_excluded_for_both_roles() {
        let opts = options();
        for path in [".env", ".env.local", "config/.envrc"] {
            assert_eq!(
                evaluate_changed_file(path, &opts).reason,
                Some(OmissionReason::Env),
                "{}",
                path
            );
            assert_eq!(
                evaluate_related_file(path, &opts).reason,
                Some(OmissionReason::Env),
                "{}",
                path
            );
        }

        let opts = ContextPackOptions {
            include_env: true,
            ..options()
        };
        assert!(evaluate_changed_file(".env", &opts).include);
        assert!(evaluate_related_file(".env.local", &opts).include);
    }

    #[test]
    fn test_hard_exclusion_is_not_overridable() {
        let opts = ContextPackOptions {
            include_env: true,
            include_secrets: true,
            include_lockfiles: true,
            include_docs: true,
            ..options()
        };
        for path in [
            "node_modules/pkg/index.js",
            "Target/debug/app",
            "pkg/foo.egg-info/PKG-INFO",
            "src/.DS_Store",
            "tmp/chatgpt_code_dump.txt",
        ] {
            assert_eq!(
                evaluate_changed_file(path, &opts).reason,
                Some(OmissionReason::GeneratedCache),
                "{}",
                path
            );
        }
    }

    #[test]
    fn test_secret_shapes() {
        assert!(is_secret_path("deploy/server.pem"));
        assert!(is_secret_path("home/.aws/credentials"));
        assert!(is_secret_path(".npmrc"));
        assert!(is_secret_path("keys/id_ed25519"));
        assert!(is_secret_path("gcp/my-service-account.json"));
        assert!(!is_secret_path("src/keyboard.rs"));

        let opts = options();
        assert_eq!(
            evaluate_related_file("certs/ca.crt", &opts).reason,
            Some(OmissionReason::Secret)
        );
    }

    #[test]
    fn test_lockfiles() {
        let opts = options();
        assert_eq!(
            evaluate_changed_file("Cargo.lock", &opts).reason,
            Some(OmissionReason::Lockfile)
        );
        assert_eq!(
            evaluate_changed_file("infra/.terraform.lock.hcl", &opts).reason,
            Some(OmissionReason::Lockfile)
        );

        let opts = ContextPackOptions {
            include_lockfiles: true,
            ..options()
        };
        assert!(evaluate_changed_file("web/yarn.lock", &opts).include);
    }

    #[test]
    fn test_changed_role_keeps_docs_and_tests() {
        let opts = ContextPackOptions {
            include_tests: false,
            ..options()
        };
        assert!(evaluate_changed_file("docs/guide.md", &opts).include);
        assert!(evaluate_changed_file("src/parser.test.ts", &opts).include);

        assert_eq!(
            evaluate_related_file("docs/guide.md", &opts).reason,
            Some(OmissionReason::Docs)
        );
        assert_eq!(
            evaluate_related_file("src/parser.test.ts", &opts).reason,
            Some(OmissionReason::Tests)
        );
    }

    #[test]
    fn test_unrecognized_extension_is_kept() {
        let opts = options();
        assert!(!is_recognized_source("assets/blob.weird"));
        assert!(evaluate_changed_file("assets/blob.weird", &opts).include);
        assert!(evaluate_related_file("assets/blob.weird", &opts).include);

        assert!(is_recognized_source("Dockerfile"));
        assert!(is_recognized_source("Gemfile.local"));
        assert!(is_recognized_source("src/Main.RS"));
    }

    #[test]
    fn test_env_wins_over_later_rules() {
        // Matches both env and docs; the earlier rule decides.
        let opts = options();
        assert_eq!(
            evaluate_related_file("docs/.env", &opts).reason,
            Some(OmissionReason::Env)
        );
    }

    #[test]
    fn test_test_like_paths() {
        assert!(is_test_path("src/__tests__/a.js"));
        assert!(is_test_path("pkg/foo_test.go"));
        assert!(is_test_path("test_utils.py"));
        assert!(is_test_path("Tests/Case.swift"));
        assert!(!is_test_path("src/testing.rs"));

        assert!(!is_test_path("fixtures/testdata/input.json"));
        assert!(is_test_like_path("fixtures/testdata/input.json"));
    }

    #[test]
    fn test_close_test_candidate() {
        let changed = vec![lower_segments("crates/core/src/parser/mod.rs")];

        assert!(is_close_test_candidate(2, "elsewhere/tests/a.rs", &changed));
        assert!(!is_close_test_candidate(3, "elsewhere/tests/a.rs", &changed));
        assert!(is_close_test_candidate(
            5,
            "crates/core/src/parser/tests.rs",
            &changed
        ));
        assert!(!is_close_test_candidate(5, "crates/core/tests/parser.rs", &changed));
        assert_eq!(max_shared_prefix_segments("crates/core/tests/x.rs", &changed), 2);
    }
}
