//! Built-in steps and their configuration form.
//!
//! | Step | Role |
//! |------|------|
//! | [`ReadFiles`] | Read files from the input folder (parallel) |
//! | [`WriteFiles`] | Write content to the output folder |
//! | [`FrontMatter`] | Move `+++` TOML or JSON front matter into metadata |
//! | [`Markdown`] | Render markdown to HTML (cached) |
//! | [`Content`] | Replace, append or prepend content |
//! | [`Meta`] | Add a metadata value |
//! | [`GroupBy`] | Group documents into `GroupKey`/`GroupDocuments` documents |
//! | [`OrderBy`] | Stable sort by a key |
//! | [`Execute`] | Run a closure (code only, not configurable) |
//! | [`Concat`] | Append the outputs of child steps |
//!
//! Pipelines declared in `config.toml` list their steps as externally tagged
//! [`StepConfig`] values:
//!
//! ```toml
//! steps = [
//!     { ReadFiles = { pattern = "*.md" } },
//!     { FrontMatter = {} },
//!     { Markdown = {} },
//!     { WriteFiles = { extension = "html" } },
//! ]
//! ```

mod concat;
mod content;
mod execute;
mod front_matter;
mod group_by;
mod markdown;
mod meta;
mod order_by;
mod read_files;
mod write_files;

pub use concat::Concat;
pub use content::{Content, ContentPosition};
pub use execute::Execute;
pub use front_matter::{FrontMatter, Split, split_front_matter};
pub use group_by::GroupBy;
pub use markdown::{Markdown, render as render_markdown};
pub use meta::Meta;
pub use order_by::OrderBy;
pub use read_files::{ReadFiles, find_files, source_path_metadata, wildcard_match};
pub use write_files::{WriteFiles, destination_metadata};

use crate::metadata::Value;
use crate::step::Step;
use serde::Deserialize;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadFilesConfig {
    /// Wildcard relative to the input folder, e.g. `"posts/*.md"`.
    pub pattern: String,
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Keep only these extensions (empty keeps everything).
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Drop these extensions.
    #[serde(default)]
    pub exclude_extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriteFilesConfig {
    /// Replace the extension of the relative path.
    pub extension: Option<String>,
    /// Metadata key holding an explicit output-relative path.
    pub path_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrontMatterConfig {}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarkdownConfig {
    /// Render this metadata value instead of the content.
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentConfig {
    pub text: String,
    #[serde(default)]
    pub position: ContentPosition,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetaConfig {
    pub key: String,
    pub value: toml::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupByConfig {
    /// Metadata key whose value is the group key.
    pub key: String,
    /// Steps run over the inputs before grouping.
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderByConfig {
    pub key: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConcatConfig {
    pub steps: Vec<StepConfig>,
}

/// A step as declared in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum StepConfig {
    ReadFiles(ReadFilesConfig),
    WriteFiles(WriteFilesConfig),
    FrontMatter(FrontMatterConfig),
    Markdown(MarkdownConfig),
    Content(ContentConfig),
    Meta(MetaConfig),
    GroupBy(GroupByConfig),
    OrderBy(OrderByConfig),
    Concat(ConcatConfig),
}

impl StepConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StepConfig::ReadFiles(_) => "ReadFiles",
            StepConfig::WriteFiles(_) => "WriteFiles",
            StepConfig::FrontMatter(_) => "FrontMatter",
            StepConfig::Markdown(_) => "Markdown",
            StepConfig::Content(_) => "Content",
            StepConfig::Meta(_) => "Meta",
            StepConfig::GroupBy(_) => "GroupBy",
            StepConfig::OrderBy(_) => "OrderBy",
            StepConfig::Concat(_) => "Concat",
        }
    }

    /// Check values serde cannot express. Nested steps are checked too.
    pub fn validate(&self) -> Result<(), String> {
        let blank = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(format!("{}.{field} must not be empty", self.name()))
            } else {
                Ok(())
            }
        };
        match self {
            StepConfig::ReadFiles(c) => blank("pattern", &c.pattern),
            StepConfig::WriteFiles(c) => {
                if c.extension.is_some() && c.path_key.is_some() {
                    return Err("WriteFiles takes either extension or path_key, not both".into());
                }
                if let Some(ext) = &c.extension {
                    blank("extension", ext.trim_start_matches('.'))?;
                }
                if let Some(key) = &c.path_key {
                    blank("path_key", key)?;
                }
                Ok(())
            }
            StepConfig::Markdown(MarkdownConfig { key: Some(key) }) => blank("key", key),
            StepConfig::Meta(c) => blank("key", &c.key),
            StepConfig::GroupBy(c) => {
                blank("key", &c.key)?;
                c.steps.iter().try_for_each(StepConfig::validate)
            }
            StepConfig::OrderBy(c) => blank("key", &c.key),
            StepConfig::Concat(c) => c.steps.iter().try_for_each(StepConfig::validate),
            StepConfig::FrontMatter(_) | StepConfig::Markdown(_) | StepConfig::Content(_) => Ok(()),
        }
    }

    pub fn build(&self) -> Box<dyn Step> {
        match self {
            StepConfig::ReadFiles(c) => Box::new(
                ReadFiles::new(c.pattern.clone())
                    .recursive(c.recursive)
                    .with_extensions(&c.extensions)
                    .without_extensions(&c.exclude_extensions),
            ),
            StepConfig::WriteFiles(c) => Box::new(match (&c.extension, &c.path_key) {
                (Some(ext), _) => WriteFiles::with_extension(ext.clone()),
                (None, Some(key)) => WriteFiles::with_path_key(key.clone()),
                (None, None) => WriteFiles::new(),
            }),
            StepConfig::FrontMatter(_) => Box::new(FrontMatter::new()),
            StepConfig::Markdown(c) => Box::new(match &c.key {
                Some(key) => Markdown::for_key(key.clone()),
                None => Markdown::new(),
            }),
            StepConfig::Content(c) => Box::new(Content::new(c.text.clone()).at(c.position)),
            StepConfig::Meta(c) => Box::new(Meta::new(c.key.clone(), Value::from(c.value.clone()))),
            StepConfig::GroupBy(c) => {
                Box::new(GroupBy::by_key(c.key.clone()).with_steps(build_steps(&c.steps)))
            }
            StepConfig::OrderBy(c) => {
                let step = OrderBy::by_key(c.key.clone());
                Box::new(if c.descending { step.descending() } else { step })
            }
            StepConfig::Concat(c) => Box::new(Concat::new(build_steps(&c.steps))),
        }
    }
}

pub fn build_steps(configs: &[StepConfig]) -> Vec<Box<dyn Step>> {
    configs.iter().map(StepConfig::build).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Steps {
        steps: Vec<StepConfig>,
    }

    fn parse(toml_text: &str) -> Vec<StepConfig> {
        toml::from_str::<Steps>(toml_text).unwrap().steps
    }

    #[test]
    fn parses_externally_tagged_steps() {
        let steps = parse(
            r#"
steps = [
    { ReadFiles = { pattern = "*.md", extensions = ["md"] } },
    { FrontMatter = {} },
    { Markdown = {} },
    { Meta = { key = "Layout", value = "post" } },
    { WriteFiles = { extension = "html" } },
]
"#,
        );
        let names: Vec<&str> = steps.iter().map(StepConfig::name).collect();
        assert_eq!(names, ["ReadFiles", "FrontMatter", "Markdown", "Meta", "WriteFiles"]);
        assert_eq!(
            steps[0],
            StepConfig::ReadFiles(ReadFilesConfig {
                pattern: "*.md".into(),
                recursive: true,
                extensions: vec!["md".into()],
                exclude_extensions: vec![],
            })
        );
    }

    #[test]
    fn nested_steps_parse_and_build() {
        let steps = parse(
            r#"
steps = [
    { Concat = { steps = [ { ReadFiles = { pattern = "extra/*" } } ] } },
    { GroupBy = { key = "Category" } },
    { OrderBy = { key = "GroupKey", descending = true } },
]
"#,
        );
        let built = build_steps(&steps);
        let names: Vec<&str> = built.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["Concat", "GroupBy", "OrderBy"]);
    }

    #[test]
    fn unknown_step_field_is_rejected() {
        let result = toml::from_str::<Steps>(r#"steps = [ { Markdown = { colour = "red" } } ]"#);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_step_name_is_rejected() {
        let result = toml::from_str::<Steps>(r#"steps = [ { Razor = {} } ]"#);
        assert!(result.is_err());
    }

    #[test]
    fn content_position_parses_lowercase() {
        let steps = parse(r#"steps = [ { Content = { text = "<hr>", position = "append" } } ]"#);
        match &steps[0] {
            StepConfig::Content(c) => assert_eq!(c.position, ContentPosition::Append),
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn validate_catches_blank_values() {
        let blank_pattern = StepConfig::ReadFiles(ReadFilesConfig {
            pattern: " ".into(),
            recursive: true,
            extensions: vec![],
            exclude_extensions: vec![],
        });
        assert!(blank_pattern.validate().is_err());

        let both = StepConfig::WriteFiles(WriteFilesConfig {
            extension: Some("html".into()),
            path_key: Some("Path".into()),
        });
        assert!(both.validate().is_err());

        let nested = StepConfig::Concat(ConcatConfig {
            steps: vec![StepConfig::GroupBy(GroupByConfig {
                key: String::new(),
                steps: vec![],
            })],
        });
        assert!(nested.validate().is_err());

        assert!(StepConfig::FrontMatter(FrontMatterConfig {}).validate().is_ok());
    }
}
