//! Native library access
//!
//! `NativeLibrary` is the seam between the invoker and native code. The
//! production implementation is `DynamicLibrary`, which loads a shared library
//! with `libloading` and handles platform-specific naming and search paths.
//! `SymbolTable` serves statically linked entry points and test doubles.

use libloading::{Library, Symbol};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Library loading errors
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Library file not found in search paths
    LibraryNotFound(String),
    /// Symbol not found in library
    SymbolNotFound { library: String, symbol: String },
    /// Failed to load library
    LoadFailed(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::LibraryNotFound(name) => write!(f, "Library not found: {}", name),
            LoadError::SymbolNotFound { library, symbol } => {
                write!(f, "Symbol '{}' not found in library '{}'", symbol, library)
            }
            LoadError::LoadFailed(msg) => write!(f, "Failed to load library: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

/// A source of native entry points
pub trait NativeLibrary: Send + Sync {
    /// Library name used in diagnostics
    fn name(&self) -> &str;

    /// Address of an exported function
    ///
    /// The pointer stays valid for as long as this library is alive.
    fn symbol(&self, name: &str) -> Result<*const (), LoadError>;
}

/// Shared library loaded at runtime
///
/// # Safety
///
/// Loading dynamic libraries is inherently unsafe. The loaded code runs in the
/// same process and can perform arbitrary operations.
pub struct DynamicLibrary {
    name: String,
    /// Resolved file, `None` when the system loader found it by name
    path: Option<PathBuf>,
    library: Library,
    /// Resolved symbol addresses
    symbols: Mutex<HashMap<String, usize>>,
}

impl DynamicLibrary {
    /// Load a library by short name or path
    ///
    /// Library name can be:
    /// - Short name: "indy" -> lib{indy}.{ext}
    /// - Full path: "/path/to/libindy.so"
    ///
    /// `extra_search_paths` are tried before the platform defaults. When no
    /// candidate file exists the platform loader gets the last word.
    ///
    /// # Safety
    ///
    /// Loading a dynamic library executes its initialization code. The caller
    /// must ensure the library is trusted.
    pub unsafe fn open(name: &str, extra_search_paths: &[PathBuf]) -> Result<Self, LoadError> {
        let mut search_paths = extra_search_paths.to_vec();
        search_paths.extend(default_search_paths());

        let (path, library) = match resolve_library_path(name, &search_paths) {
            Some(path) => {
                let library =
                    Library::new(&path).map_err(|e| LoadError::LoadFailed(e.to_string()))?;
                (Some(path), library)
            }
            None => {
                let library = Library::new(libloading::library_filename(name))
                    .map_err(|_| LoadError::LibraryNotFound(name.to_string()))?;
                (None, library)
            }
        };

        debug!(library = name, path = ?path, "Loaded native library");

        Ok(Self {
            name: name.to_string(),
            path,
            library,
            symbols: Mutex::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl NativeLibrary for DynamicLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self, name: &str) -> Result<*const (), LoadError> {
        let mut symbols = self.symbols.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&address) = symbols.get(name) {
            return Ok(address as *const ());
        }

        // Safety: the address is only reinterpreted as a function pointer by
        // callers that know its signature, and `self.library` outlives it.
        let address = unsafe {
            let symbol: Symbol<'_, unsafe extern "C" fn()> = self
                .library
                .get(name.as_bytes())
                .map_err(|_| LoadError::SymbolNotFound {
                    library: self.name.clone(),
                    symbol: name.to_string(),
                })?;
            *symbol as usize
        };

        symbols.insert(name.to_string(), address);
        Ok(address as *const ())
    }
}

/// Static table of entry points
///
/// Used for libraries linked into the binary, and for tests.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    name: String,
    symbols: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbols: HashMap::new(),
        }
    }

    /// Add an entry point, builder style
    pub fn with(mut self, symbol: &str, address: *const ()) -> Self {
        self.insert(symbol, address);
        self
    }

    pub fn insert(&mut self, symbol: &str, address: *const ()) {
        self.symbols.insert(symbol.to_string(), address as usize);
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl NativeLibrary for SymbolTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self, name: &str) -> Result<*const (), LoadError> {
        self.symbols
            .get(name)
            .map(|&address| address as *const ())
            .ok_or_else(|| LoadError::SymbolNotFound {
                library: self.name.clone(),
                symbol: name.to_string(),
            })
    }
}

/// Get platform-specific default library search paths
///
/// Returns standard system library paths for the current platform:
/// - Linux: /usr/lib, /usr/local/lib, /lib
/// - macOS: /usr/lib, /usr/local/lib, /opt/homebrew/lib
/// - Windows: C:\Windows\System32
/// - All platforms: current working directory
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/lib"));

        if cfg!(target_pointer_width = "64") {
            paths.push(PathBuf::from("/usr/lib64"));
            paths.push(PathBuf::from("/lib64"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/opt/homebrew/lib"));
    }

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from("C:\\Windows\\System32"));
    }

    // Current working directory (highest priority)
    if let Ok(cwd) = std::env::current_dir() {
        paths.insert(0, cwd);
    }

    paths
}

/// Resolve library name to full path with platform-specific naming
///
/// Handles platform-specific library naming conventions:
/// - Linux: lib{name}.so
/// - macOS: lib{name}.dylib or lib{name}.so
/// - Windows: {name}.dll
pub fn resolve_library_path(name: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
    // If name is already a path, use it directly
    let path = Path::new(name);
    if path.components().count() > 1 || path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }

    let extensions: &[&str] = if cfg!(target_os = "windows") {
        &["dll"]
    } else if cfg!(target_os = "macos") {
        &["dylib", "so"]
    } else {
        &["so"]
    };

    let prefixes: &[&str] = if cfg!(target_os = "windows") {
        &["", "lib"]
    } else {
        &["lib", ""]
    };

    for search_path in search_paths {
        for prefix in prefixes {
            for ext in extensions {
                let full_path = search_path.join(format!("{}{}.{}", prefix, name, ext));
                if full_path.exists() {
                    return Some(full_path);
                }
            }
        }
    }

    None
}
