use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs, OutputArgs, SelectionArgs};
use crate::core::materialize::MaterializeOptions;
use crate::core::matcher::{DEFAULT_EXCLUDED_DIRS, DirExclusions, ExtensionSet};
use crate::core::pack::PackOptions;
use crate::infra::utils::expand_path;

/// Config files probed in the working directory, first match wins.
pub const CONFIG_FILES: [&str; 4] = ["relay.toml", "relay.yaml", "relay.json", ".relay.toml"];

/// Prefix for environment overrides, e.g. `RELAY_OVERWRITE=true`,
/// `RELAY_MODEL__COMMAND=llm,-s`.
pub const ENV_PREFIX: &str = "RELAY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Where split and code turns write files
    pub output_dir: PathBuf,

    /// Accepted source extensions, without the dot
    pub extensions: Vec<String>,

    /// Replace existing files by default
    pub overwrite: bool,

    /// Directory names never descended into
    pub exclude_dirs: Vec<String>,

    /// Extra globs ignored during the walk (relative to each root)
    pub ignore_patterns: Vec<String>,

    /// Honor .gitignore files
    pub respect_gitignore: bool,

    /// Package dotfiles
    pub include_hidden: bool,

    /// Unescape XML entities in reply content before writing
    pub unescape_xml: bool,

    /// Write reply files by base name only
    pub flatten: bool,

    /// Where session transcripts are kept
    pub transcript_dir: PathBuf,

    /// Model adapter settings
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig
{
    /// Program plus arguments; receives the request as JSON on stdin
    pub command: Vec<String>,

    /// Model name forwarded with each request
    pub name: Option<String>,

    /// File holding the system prompt for code-generation turns
    pub coder_system_prompt: PathBuf,

    /// File holding the system prompt for general turns
    pub general_system_prompt: PathBuf,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            output_dir: PathBuf::from("."),
            extensions: ["py", "rs", "js", "ts", "go", "java", "c", "h", "cpp", "md", "toml"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            overwrite: false,
            exclude_dirs: DEFAULT_EXCLUDED_DIRS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignore_patterns: Vec::new(),
            respect_gitignore: false,
            include_hidden: true,
            unescape_xml: false,
            flatten: false,
            transcript_dir: PathBuf::from("~/.relay/sessions"),
            model: ModelConfig::default(),
        }
    }
}

impl Default for ModelConfig
{
    fn default() -> Self
    {
        Self {
            command: Vec::new(),
            name: None,
            coder_system_prompt: PathBuf::from("~/.relay_coder_system_prompt.txt"),
            general_system_prompt: PathBuf::from("~/.relay_general_system_prompt.txt"),
        }
    }
}

impl ModelConfig
{
    /// Read a system prompt file. A missing file means no system prompt.
    pub fn read_prompt(path: &Path) -> Result<Option<String>>
    {
        let path = expand_path(path)?;
        if !path.exists()
        {
            tracing::debug!(path = %path.display(), "no system prompt file");
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read system prompt {}", path.display()))?;
        Ok(Some(text))
    }
}

fn from_builder(
    mut builder: config::ConfigBuilder<config::builder::DefaultState>
) -> Result<Config>
{
    // Add environment variables with RELAY_ prefix; `__` separates nesting
    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("extensions")
            .with_list_parse_key("exclude_dirs")
            .with_list_parse_key("ignore_patterns")
            .with_list_parse_key("model.command")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn load_config() -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    for path in &CONFIG_FILES
    {
        if Path::new(path).exists()
        {
            tracing::debug!(file = path, "loading config");
            builder = builder.add_source(config::File::with_name(path));
            break;
        }
    }

    from_builder(builder)
}

/// Everything one run needs, merged from config and flags. Passed by
/// reference into the core and never mutated.
#[derive(Debug, Clone)]
pub struct PipelineConfig
{
    pub extensions: ExtensionSet,
    pub pack: PackOptions,
    pub materialize: MaterializeOptions,
    pub output_dir: PathBuf,
}

impl PipelineConfig
{
    /// Merge `cfg` with command-line selection and output flags. Flags
    /// only ever switch things on; a list on the command line replaces
    /// the configured extensions.
    pub fn resolve(
        cfg: &Config,
        selection: &SelectionArgs,
        output: Option<&OutputArgs>,
    ) -> Result<Self>
    {
        let extensions = match &selection.extensions
        {
            Some(list) => ExtensionSet::parse_list(list),
            None => ExtensionSet::new(&cfg.extensions),
        }
        .context("No file extensions selected")?;

        let mut ignore_patterns = cfg
            .ignore_patterns
            .clone();
        ignore_patterns.extend(
            selection
                .exclude
                .iter()
                .cloned(),
        );

        let pack = PackOptions {
            exclusions: DirExclusions::new(&cfg.exclude_dirs),
            ignore_patterns,
            respect_gitignore: cfg.respect_gitignore || selection.gitignore,
            include_hidden: cfg.include_hidden && !selection.no_hidden,
        };

        let mut materialize = MaterializeOptions {
            overwrite: cfg.overwrite,
            unescape_xml: cfg.unescape_xml,
            flatten: cfg.flatten,
        };
        let mut output_dir = cfg
            .output_dir
            .clone();

        if let Some(out) = output
        {
            materialize.overwrite |= out.force;
            materialize.unescape_xml |= out.unescape_xml;
            materialize.flatten |= out.flatten;
            if let Some(dir) = &out.output_dir
            {
                output_dir = dir.clone();
            }
        }

        Ok(Self {
            extensions,
            pack,
            materialize,
            output_dir: expand_path(&output_dir)?,
        })
    }
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILES[0]);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    if ctx.dry_run
    {
        if !ctx.quiet
        {
            println!("DRY RUN: Would create {}", config_path.display());
        }
        return Ok(());
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use config::{File, FileFormat};

    fn parse(toml_text: &str) -> Result<Config>
    {
        from_builder(
            config::Config::builder().add_source(File::from_str(toml_text, FileFormat::Toml)),
        )
    }

    #[test]
    fn test_default_config_round_trips_through_toml() -> Result<()>
    {
        let text = toml::to_string_pretty(&Config::default())?;
        let cfg = parse(&text)?;
        assert_eq!(cfg.extensions, Config::default().extensions);
        assert_eq!(cfg.exclude_dirs.len(), DEFAULT_EXCLUDED_DIRS.len());
        assert!(cfg.include_hidden);
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()>
    {
        let cfg = parse("overwrite = true\n[model]\ncommand = [\"llm\", \"-s\"]\n")?;
        assert!(cfg.overwrite);
        assert_eq!(cfg.model.command, vec!["llm", "-s"]);
        assert_eq!(cfg.output_dir, PathBuf::from("."));
        assert!(!cfg.extensions.is_empty());
        Ok(())
    }

    #[test]
    fn test_flags_override_config() -> Result<()>
    {
        let cfg = Config::default();
        let selection = SelectionArgs {
            extensions: Some("RS,.toml".into()),
            exclude: vec!["**/gen/**".into()],
            gitignore: true,
            no_hidden: true,
        };
        let output = OutputArgs {
            output_dir: Some(PathBuf::from("out")),
            force: true,
            unescape_xml: false,
            flatten: true,
        };

        let p = PipelineConfig::resolve(&cfg, &selection, Some(&output))?;
        assert_eq!(p.extensions.iter().collect::<Vec<_>>(), vec!["rs", "toml"]);
        assert_eq!(p.pack.ignore_patterns, vec!["**/gen/**"]);
        assert!(p.pack.respect_gitignore);
        assert!(!p.pack.include_hidden);
        assert!(p.materialize.overwrite);
        assert!(p.materialize.flatten);
        assert!(!p.materialize.unescape_xml);
        assert_eq!(p.output_dir, PathBuf::from("out"));
        Ok(())
    }

    #[test]
    fn test_empty_extension_list_is_rejected() -> Result<()>
    {
        let selection = SelectionArgs { extensions: Some(" , ".into()), ..Default::default() };
        assert!(PipelineConfig::resolve(&Config::default(), &selection, None).is_err());
        Ok(())
    }
}
