//! Embedded bundle templates.
//!
//! Resource files placed into a framework bundle are embedded at compile time
//! from `templates/framework/` and rendered by replacing `{{NAME}}`
//! placeholders. Rendering fails if any placeholder survives.

use std::path::Path;

use include_dir::{Dir, include_dir};

use crate::types::BindError;

static FRAMEWORK_TEMPLATES: Dir = include_dir!("$CARGO_MANIFEST_DIR/templates/framework");

/// Template for `Resources/Info.plist`.
pub const INFO_PLIST: &str = "Info.plist";

/// Template for `Modules/module.modulemap`.
pub const MODULE_MAP: &str = "module.modulemap";

/// A template variable for substitution.
#[derive(Debug, Clone)]
pub struct TemplateVar {
    pub name: &'static str,
    pub value: String,
}

impl TemplateVar {
    pub fn new(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Renders the embedded template `name` (without the `.template` suffix).
pub fn render(name: &str, vars: &[TemplateVar]) -> Result<String, BindError> {
    let file_name = format!("{}.template", name);
    let file = FRAMEWORK_TEMPLATES
        .get_file(&file_name)
        .ok_or_else(|| BindError::Config(format!("no embedded template named {}", name)))?;
    let text = file
        .contents_utf8()
        .ok_or_else(|| BindError::Config(format!("template {} is not valid UTF-8", name)))?;

    let rendered = render_template(text, vars);
    validate_no_unreplaced_placeholders(&rendered, Path::new(name))?;
    Ok(rendered)
}

fn render_template(input: &str, vars: &[TemplateVar]) -> String {
    let mut output = input.to_string();
    for var in vars {
        output = output.replace(&format!("{{{{{}}}}}", var.name), &var.value);
    }
    output
}

fn validate_no_unreplaced_placeholders(content: &str, file_path: &Path) -> Result<(), BindError> {
    let mut pos = 0;
    let mut unreplaced = Vec::new();

    while let Some(start) = content[pos..].find("{{") {
        let abs_start = pos + start;
        let Some(end) = content[abs_start..].find("}}") else {
            break;
        };
        let var_name = &content[abs_start + 2..abs_start + end];
        if !var_name.is_empty() && !var_name.contains(' ') {
            unreplaced.push(content[abs_start..abs_start + end + 2].to_string());
        }
        pos = abs_start + end + 2;
    }

    if !unreplaced.is_empty() {
        return Err(BindError::Config(format!(
            "template {:?} has unreplaced placeholders {:?}",
            file_path, unreplaced
        )));
    }
    Ok(())
}

/// Converts a crate or library name to PascalCase (`my_lib` -> `MyLib`).
pub fn to_pascal_case(input: &str) -> String {
    input
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| {
            let mut chars = s.chars();
            match chars.next() {
                Some(first) => {
                    let rest: String = chars.map(|c| c.to_ascii_lowercase()).collect();
                    format!("{}{}", first.to_ascii_uppercase(), rest)
                }
                None => String::new(),
            }
        })
        .collect()
}

/// Reduces a name to the characters allowed in a bundle identifier component.
pub fn sanitize_bundle_id_component(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_map_renders() {
        let rendered = render(
            MODULE_MAP,
            &[
                TemplateVar::new("MODULE_NAME", "Demo"),
                TemplateVar::new("HEADERS", "    header \"demo.h\""),
            ],
        )
        .unwrap();
        assert!(rendered.starts_with("framework module \"Demo\" {\n"));
        assert!(rendered.contains("    header \"demo.h\"\n"));
        assert!(rendered.contains("export *"));
    }

    #[test]
    fn info_plist_requires_every_variable() {
        let err = render(INFO_PLIST, &[TemplateVar::new("TITLE", "Demo")]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("{{BUNDLE_ID}}"));
    }

    #[test]
    fn unknown_template() {
        assert!(render("nope.txt", &[]).is_err());
    }

    #[test]
    fn placeholder_validation() {
        assert!(validate_no_unreplaced_placeholders("plain", Path::new("x")).is_ok());
        assert!(validate_no_unreplaced_placeholders("{{ spaced }}", Path::new("x")).is_ok());
        assert!(validate_no_unreplaced_placeholders("a {{NAME}}", Path::new("x")).is_err());
    }

    #[test]
    fn pascal_case() {
        assert_eq!(to_pascal_case("my_lib"), "MyLib");
        assert_eq!(to_pascal_case("my-bind-lib"), "MyBindLib");
        assert_eq!(to_pascal_case("demo"), "Demo");
        assert_eq!(to_pascal_case("__"), "");
    }

    #[test]
    fn bundle_id_component() {
        assert_eq!(sanitize_bundle_id_component("My_Lib-2"), "mylib2");
    }
}
