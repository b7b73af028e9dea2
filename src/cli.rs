use clap::Parser;
use std::path::{Component, Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "bufzip")]
#[command(version)]
#[command(about = "List, test and extract ZIP archives loaded into memory", long_about = None)]
#[command(after_help = "Examples:\n  \
  bufzip data1.zip -x joe        extract all files except joe from data1.zip\n  \
  bufzip -p foo.zip | more       send contents of foo.zip via pipe into more\n  \
  bufzip -t foo.zip              verify every entry against its CRC-32\n  \
  bufzip -l https://example.com/archive.zip   list files from remote ZIP")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely/show version info
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Test archive files (verify CRC-32)
    #[arg(short = 't')]
    pub test: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Connection attempts for HTTP sources before giving up
    #[arg(long = "retries", value_name = "N", default_value_t = 10)]
    pub retries: u32,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Whether an entry name passes the positional and `-x` filters.
    pub fn selects(&self, name: &str) -> bool {
        if !self.files.is_empty() {
            let matches = self.files.iter().any(|f| {
                if has_glob_chars(f) {
                    // Pattern contains wildcards: use glob matching
                    glob_match(f, name)
                } else {
                    // No wildcards: exact match on filename or full path
                    name == f.as_str() || basename(name) == f.as_str()
                }
            });
            if !matches {
                return false;
            }
        }

        !self
            .exclude
            .iter()
            .any(|x| name.contains(x.as_str()) || glob_match(x, name))
    }

    /// Where an entry is written on extraction.
    ///
    /// Honors `-d` and `-j`. Root, prefix and `..` components are dropped so
    /// an entry can never land outside the output directory; `None` means
    /// nothing usable is left of the name.
    pub fn output_path(&self, name: &str) -> Option<PathBuf> {
        let name = if self.junk_paths { basename(name) } else { name };

        let relative: PathBuf = Path::new(name)
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect();
        if relative.as_os_str().is_empty() {
            return None;
        }

        Some(match &self.extract_dir {
            Some(dir) => PathBuf::from(dir).join(relative),
            None => relative,
        })
    }
}

/// Last path component of an archive entry name.
pub fn basename(name: &str) -> &str {
    name.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(name)
}

/// Check if a pattern contains glob wildcard characters.
pub fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            // Star matches zero characters, or one more and stays in play
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
