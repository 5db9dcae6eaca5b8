//! Output generation for finished runs.
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── 081502_tecnologia.json
//!     └── 093010_story.json
//! ```

pub mod json;
