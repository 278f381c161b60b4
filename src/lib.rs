//! Run the TypeScript compiler's type-checking pass against an explicit list
//! of source files instead of the whole project a tsconfig implies. Intended
//! for incremental workflows (pre-commit hooks, CI diff checks) where only a
//! handful of files changed and re-checking everything is wasteful.
//!
//! Input files may live in different packages of a monorepo. Each file is
//! attributed to its governing configuration by walking the directory tree
//! upward for the nearest `tsconfig.json` (or an explicit override), and the
//! inputs are partitioned into one group per configuration. Each group then
//! gets a temporary, self-contained configuration whose `files` list is
//! narrowed to exactly what the compiler needs, and is checked in its own
//! compiler invocation.
//!
//! Narrowing has to include every file the roots depend on, and enumerating
//! those requires following `import` statements. From the [tsconfig exclude]
//! documentation:
//!
//! > Important: `exclude` *only* changes which files are included as a result
//! > of the `include` setting. A file specified by exclude can still become
//! > part of your codebase due to an import statement in your code, a types
//! > inclusion, a `/// <reference` directive, or being specified in the
//! > `files` list.
//!
//! The TypeScript compiler is a project where the implementation is the
//! spec, so we do not reimplement that algorithm: discovery invokes the real
//! compiler with the [listFilesOnly] flag and harvests the program it built.
//! When discovery fails for any reason the group degrades to the original
//! include/exclude patterns, which is slower but never less correct.
//!
//! [listfilesonly]: https://www.typescriptlang.org/docs/handbook/compiler-options.html#compiler-options
//! [tsconfig exclude]: https://www.typescriptlang.org/tsconfig#exclude

#![forbid(unsafe_code)]
#![deny(missing_debug_implementations)]

pub mod closure;
pub mod config;
pub mod error;
pub mod extensions;
pub mod grouping;
pub mod io;
pub mod path;
pub mod runner;
pub mod synthesize;

mod find_up;
