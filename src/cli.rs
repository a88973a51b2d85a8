use nearmatch_core::{AverageBase, ConfigError, RunConfig, SelectionPolicy};
use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const USAGE: &str = "\
usage: nearmatch [key=value | --key=value]... [candidate_root]

keys:
  candidate_root, facefake   directory of candidate images to rank
  reference_root, facereal   directory of reference images (default: facereal)
  output_root                parent of the output directories (default: <candidate_root>-best)
  concurrency, cpucore       worker threads (default: 4)
  top_n                      keep the N best candidates (default: 20)
  max_distance, maxdistance  keep candidates whose average is at most this
  model_tag, model           comma list of metrics: combined, ahash, dhash, color
  backend_tag, backend       comma list of decoders: image, opencv
  cap                        accepted comparisons per reference (default: 50000)
  timeout_ms                 per comparison limit, 0 disables (default: 30000)
  average                    divisor: references or contributions
  extensions                 comma list of image extensions
  manifest                   write ranking.json: true or false
  config                     TOML file read before applying these keys

flags:
  --no-thread                same as concurrency=1
  --help, --version";

/// Command-line overrides, applied on top of the TOML configuration.
#[derive(Debug, Default, PartialEq)]
pub struct CliConfig {
    pub config_file: Option<PathBuf>,
    pub reference_root: Option<PathBuf>,
    pub candidate_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub cap: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub selection: Option<SelectionPolicy>,
    pub models: Option<Vec<String>>,
    pub backends: Option<Vec<String>>,
    pub average: Option<AverageBase>,
    pub extensions: Option<Vec<String>>,
    pub manifest: Option<bool>,
}

#[derive(Debug, PartialEq)]
pub enum CliError {
    Help,
    Version,
    InvalidFlag(String),
    InvalidValue { key: String, value: String },
    ConflictingSelection,
}

impl CliConfig {
    pub fn from_env() -> Result<Self, CliError> {
        Self::from_iter(env::args().skip(1))
    }

    pub fn from_iter<I>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        let mut top_n: Option<usize> = None;
        let mut max_distance: Option<f64> = None;

        for arg in args {
            match arg.as_str() {
                "--help" | "-h" => return Err(CliError::Help),
                "--version" | "-V" => return Err(CliError::Version),
                "--no-thread" => {
                    config.concurrency = Some(1);
                    continue;
                }
                _ => {}
            }

            let token = arg.strip_prefix("--").unwrap_or(&arg);
            let Some((key, value)) = token.split_once('=') else {
                if arg.starts_with("--") || config.candidate_root.is_some() {
                    return Err(CliError::InvalidFlag(arg));
                }
                config.candidate_root = Some(PathBuf::from(&arg));
                continue;
            };

            match key {
                "config" => config.config_file = Some(PathBuf::from(value)),
                "candidate_root" | "facefake" => config.candidate_root = Some(PathBuf::from(value)),
                "reference_root" | "facereal" => config.reference_root = Some(PathBuf::from(value)),
                "output_root" => config.output_root = Some(PathBuf::from(value)),
                "concurrency" | "cpucore" => config.concurrency = Some(parse_positive(key, value)?),
                "cap" => config.cap = Some(parse_positive(key, value)?),
                "timeout_ms" => config.timeout_ms = Some(parse_number(key, value)?),
                "top_n" => top_n = Some(parse_positive(key, value)?),
                "max_distance" | "maxdistance" => {
                    let max: f64 = parse_number(key, value)?;
                    if !(max.is_finite() && max >= 0.0) {
                        return Err(invalid(key, value));
                    }
                    max_distance = Some(max);
                }
                "model_tag" | "model" => config.models = Some(parse_list(key, value)?),
                "backend_tag" | "backend" => config.backends = Some(parse_list(key, value)?),
                "extensions" => config.extensions = Some(parse_list(key, value)?),
                "average" => {
                    config.average =
                        Some(AverageBase::from_tag(value).ok_or_else(|| invalid(key, value))?)
                }
                "manifest" => config.manifest = Some(parse_bool(key, value)?),
                _ => return Err(CliError::InvalidFlag(arg)),
            }
        }

        config.selection = match (top_n, max_distance) {
            (Some(_), Some(_)) => return Err(CliError::ConflictingSelection),
            (Some(limit), None) => Some(SelectionPolicy::TopN(limit)),
            (None, Some(max)) => Some(SelectionPolicy::Threshold(max)),
            (None, None) => None,
        };
        Ok(config)
    }

    /// Loads the configuration file and applies the command-line overrides.
    pub fn resolve(&self) -> Result<RunConfig, ConfigError> {
        let base = match &self.config_file {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::load_or_default()?,
        };
        let config = self.apply(base);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, mut config: RunConfig) -> RunConfig {
        if let Some(root) = &self.reference_root {
            config.reference_root = root.clone();
        }
        if let Some(root) = &self.candidate_root {
            config.candidate_root = Some(root.clone());
        }
        if let Some(root) = &self.output_root {
            config.output_root = Some(root.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(cap) = self.cap {
            config.cap = cap;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(selection) = self.selection {
            config.selection = selection;
        }
        if let Some(models) = &self.models {
            config.models = models.clone();
        }
        if let Some(backends) = &self.backends {
            config.backends = backends.clone();
        }
        if let Some(average) = self.average {
            config.average = average;
        }
        if let Some(extensions) = &self.extensions {
            config.extensions = extensions.clone();
        }
        if let Some(manifest) = self.manifest {
            config.manifest = manifest;
        }
        config
    }
}

fn invalid(key: &str, value: &str) -> CliError {
    CliError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, CliError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_positive(key: &str, value: &str) -> Result<usize, CliError> {
    match parse_number(key, value)? {
        0 => Err(invalid(key, value)),
        number => Ok(number),
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, CliError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn parse_list(key: &str, value: &str) -> Result<Vec<String>, CliError> {
    let items: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| item.trim_start_matches('.').to_string())
        .collect();
    if items.is_empty() {
        return Err(invalid(key, value));
    }
    Ok(items)
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Help => write!(f, "{}", USAGE),
            Self::Version => write!(f, "nearmatch {}", env!("CARGO_PKG_VERSION")),
            Self::InvalidFlag(flag) => write!(f, "unrecognized argument: {}\n\n{}", flag, USAGE),
            Self::InvalidValue { key, value } => {
                write!(f, "invalid value for {}: {:?}", key, value)
            }
            Self::ConflictingSelection => {
                write!(f, "top_n and max_distance cannot be combined")
            }
        }
    }
}

impl Error for CliError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn parses_legacy_key_value_tokens() {
        let config = CliConfig::from_iter(args(&[
            "cpucore=8",
            "maxdistance=0.35",
            "facefake=outputs/txt2img-images",
        ]))
        .unwrap();
        assert_eq!(config.concurrency, Some(8));
        assert_eq!(config.selection, Some(SelectionPolicy::Threshold(0.35)));
        assert_eq!(
            config.candidate_root,
            Some(PathBuf::from("outputs/txt2img-images"))
        );
    }

    #[test]
    fn parses_flag_form_and_lists() {
        let config = CliConfig::from_iter(args(&[
            "--candidate_root=./fakes",
            "--top_n=5",
            "--model=ahash, dhash",
            "--extensions=.JPG,png",
            "--average=contributions",
            "--manifest=false",
            "--no-thread",
        ]))
        .unwrap();
        assert_eq!(config.candidate_root, Some(PathBuf::from("./fakes")));
        assert_eq!(config.selection, Some(SelectionPolicy::TopN(5)));
        assert_eq!(
            config.models,
            Some(vec![String::from("ahash"), String::from("dhash")])
        );
        assert_eq!(
            config.extensions,
            Some(vec![String::from("JPG"), String::from("png")])
        );
        assert_eq!(config.average, Some(AverageBase::Contributions));
        assert_eq!(config.manifest, Some(false));
        assert_eq!(config.concurrency, Some(1));
    }

    #[test]
    fn positional_argument_is_candidate_root() {
        let config = CliConfig::from_iter(args(&["./fakes"])).unwrap();
        assert_eq!(config.candidate_root, Some(PathBuf::from("./fakes")));
        let result = CliConfig::from_iter(args(&["./fakes", "./extra"]));
        assert!(matches!(result, Err(CliError::InvalidFlag(_))));
    }

    #[test]
    fn rejects_conflicting_selection() {
        let result = CliConfig::from_iter(args(&["top_n=3", "max_distance=0.5"]));
        assert_eq!(result, Err(CliError::ConflictingSelection));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            CliConfig::from_iter(args(&["cpucore=0"])),
            Err(CliError::InvalidValue { .. })
        ));
        assert!(matches!(
            CliConfig::from_iter(args(&["maxdistance=-1"])),
            Err(CliError::InvalidValue { .. })
        ));
        assert!(matches!(
            CliConfig::from_iter(args(&["average=median"])),
            Err(CliError::InvalidValue { .. })
        ));
        assert!(matches!(
            CliConfig::from_iter(args(&["--unknown=1"])),
            Err(CliError::InvalidFlag(_))
        ));
    }

    #[test]
    fn help_and_version_short_circuit() {
        assert_eq!(
            CliConfig::from_iter(args(&["cpucore=2", "--help"])),
            Err(CliError::Help)
        );
        assert_eq!(
            CliConfig::from_iter(args(&["--version"])),
            Err(CliError::Version)
        );
    }

    #[test]
    fn overrides_apply_over_file_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(
            &path,
            "candidate_root = \"from-file\"\nconcurrency = 2\nselection = { max_distance = 0.5 }\n",
        )
        .unwrap();

        let cli = CliConfig::from_iter(vec![
            format!("config={}", path.display()),
            String::from("top_n=3"),
            String::from("backend=image"),
        ])
        .unwrap();
        let config = cli.resolve().unwrap();
        assert_eq!(config.candidate_root, Some(PathBuf::from("from-file")));
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.selection, SelectionPolicy::TopN(3));
        assert_eq!(config.backends, vec![String::from("image")]);
    }

    #[test]
    fn untouched_keys_keep_defaults() {
        let cli = CliConfig::from_iter(args(&["facefake=fakes"])).unwrap();
        let config = cli.apply(RunConfig::default());
        assert_eq!(config.selection, SelectionPolicy::TopN(20));
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.reference_root, PathBuf::from("facereal"));
    }
}
