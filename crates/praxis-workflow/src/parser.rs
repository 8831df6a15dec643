use std::path::Path;

use serde::Deserialize;

use crate::types::{Branch, CompletionType, Phase, Step, Workflow};

#[derive(Debug, Deserialize)]
struct Frontmatter {
    name: String,
    #[serde(default)]
    description: String,
    // Informational only: the authoritative phase order is the order of
    // `## Phase:` headings in the body.
    #[serde(default)]
    #[allow(dead_code)]
    phases: Vec<String>,
}

pub async fn parse_workflow_file(path: impl AsRef<Path>) -> anyhow::Result<Workflow> {
    let content = tokio::fs::read_to_string(path.as_ref())
        .await
        .map_err(|err| anyhow::anyhow!("failed to read workflow file: {err}"))?;
    parse_workflow(&content)
}

/// Parses a workflow definition: YAML frontmatter between `---` delimiters,
/// then a markdown body of `## Phase:` headings with Steps, Completion
/// Criteria, and Branches sections. The body parser is tolerant; unknown
/// sections and blank lines are ignored.
pub fn parse_workflow(content: &str) -> anyhow::Result<Workflow> {
    let mut parts = content.splitn(3, "---");
    let _leading = parts.next();
    let frontmatter_raw = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("invalid workflow format: missing YAML frontmatter"))?;
    let body = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("invalid workflow format: missing YAML frontmatter"))?;

    let frontmatter: Frontmatter = serde_yaml::from_str(frontmatter_raw)
        .map_err(|err| anyhow::anyhow!("failed to parse frontmatter: {err}"))?;

    Ok(Workflow {
        name: frontmatter.name,
        description: frontmatter.description,
        phases: parse_body(body),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Steps,
    Completion,
    Branches,
}

fn parse_body(body: &str) -> Vec<Phase> {
    let mut phases = Vec::new();
    let mut current: Option<Phase> = None;
    let mut section = Section::None;

    for line in body.lines() {
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("## Phase:") {
            if let Some(phase) = current.take() {
                phases.push(phase);
            }
            current = Some(Phase {
                name: rest.trim().to_string(),
                steps: Vec::new(),
                completion: Default::default(),
                branches: Vec::new(),
            });
            section = Section::None;
            continue;
        }

        let Some(phase) = current.as_mut() else {
            continue;
        };

        if let Some(rest) = trimmed.strip_prefix("###") {
            section = match rest.trim().to_lowercase().as_str() {
                "steps" => Section::Steps,
                "completion criteria" | "completion" => Section::Completion,
                "branches" => Section::Branches,
                _ => Section::None,
            };
            continue;
        }

        match section {
            Section::Steps => {
                if trimmed.starts_with('-') || trimmed.starts_with('*') {
                    if let Some(step) = parse_step(trimmed) {
                        phase.steps.push(step);
                    }
                }
            }
            Section::Completion => {
                if !trimmed.is_empty() && !trimmed.starts_with('#') {
                    if !phase.completion.description.is_empty() {
                        phase.completion.description.push(' ');
                    }
                    phase.completion.description.push_str(trimmed);

                    let lower = trimmed.to_lowercase();
                    phase.completion.kind = if lower.contains("all") && lower.contains("required") {
                        CompletionType::AllRequired
                    } else if lower.contains("branch") {
                        CompletionType::AnyBranch
                    } else {
                        CompletionType::Custom
                    };
                }
            }
            Section::Branches => {
                if trimmed.starts_with('-') || trimmed.starts_with('*') {
                    if let Some(branch) = parse_branch(trimmed) {
                        phase.branches.push(branch);
                    }
                }
            }
            Section::None => {}
        }
    }

    if let Some(phase) = current {
        phases.push(phase);
    }

    phases
}

/// Parses `- step_id: Name (required)` or `- Name`; an ID is derived from
/// the name when no colon is present.
fn parse_step(line: &str) -> Option<Step> {
    let line = line
        .trim_start_matches('-')
        .trim_start_matches('*')
        .trim();
    if line.is_empty() {
        return None;
    }

    let required = line.to_lowercase().contains("(required)");
    let line = line
        .replace("(required)", "")
        .replace("(Required)", "")
        .trim()
        .to_string();

    if let Some((id, name)) = line.split_once(':') {
        let name = name.trim().to_string();
        Some(Step {
            id: id.trim().to_string(),
            description: name.clone(),
            name,
            required,
        })
    } else {
        Some(Step {
            id: line.to_lowercase().replace(' ', "_"),
            description: line.clone(),
            name: line,
            required,
        })
    }
}

/// Parses `- condition → description` or `- condition: description`; with
/// neither separator the whole text is both.
fn parse_branch(line: &str) -> Option<Branch> {
    let line = line
        .trim_start_matches('-')
        .trim_start_matches('*')
        .trim();
    if line.is_empty() {
        return None;
    }

    let (condition, description) = if let Some((cond, desc)) = line.split_once('→') {
        (cond.trim(), desc.trim())
    } else if let Some((cond, desc)) = line.split_once(':') {
        (cond.trim(), desc.trim())
    } else {
        (line, line)
    };

    Some(Branch {
        condition: condition.to_string(),
        description: description.to_string(),
        target_phase: None,
        steps: Vec::new(),
    })
}

/// Resolves a workflow by name against the workspace: `workflows/<name>.md`,
/// `workflows/<name>`, `<name>.md`, `<name>` — first existing file wins.
pub async fn load_workflow(workspace: impl AsRef<Path>, name: &str) -> anyhow::Result<Workflow> {
    let workspace = workspace.as_ref();
    let candidates = [
        workspace.join("workflows").join(format!("{name}.md")),
        workspace.join("workflows").join(name),
        workspace.join(format!("{name}.md")),
        workspace.join(name),
    ];

    for path in &candidates {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return parse_workflow_file(path).await;
        }
    }

    anyhow::bail!("workflow not found: {name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"---
name: web-recon
description: Web reconnaissance methodology
phases:
  - Discovery
  - Enumeration
---

## Phase: Discovery

### Steps
- port_scan: Scan common ports (required)
- Identify technologies

### Completion Criteria
All required steps must be complete
before moving on.

### Branches
- web_service_found → Investigate the web service
- smb_found: Investigate SMB shares
- dns_wildcard

## Phase: Enumeration

### Steps
- dir_brute: Brute force directories (Required)

### Completion
A branch should be opened here.
"#;

    #[test]
    fn parses_frontmatter_and_phases() {
        let workflow = parse_workflow(SAMPLE).expect("parse");
        assert_eq!(workflow.name, "web-recon");
        assert_eq!(workflow.description, "Web reconnaissance methodology");
        assert_eq!(workflow.phases.len(), 2);
        assert_eq!(workflow.phases[0].name, "Discovery");
        assert_eq!(workflow.phases[1].name, "Enumeration");
    }

    #[test]
    fn parses_steps_with_ids_required_flags_and_derived_ids() {
        let workflow = parse_workflow(SAMPLE).expect("parse");
        let steps = &workflow.phases[0].steps;
        assert_eq!(steps.len(), 2);

        assert_eq!(steps[0].id, "port_scan");
        assert_eq!(steps[0].name, "Scan common ports");
        assert!(steps[0].required);

        assert_eq!(steps[1].id, "identify_technologies");
        assert_eq!(steps[1].name, "Identify technologies");
        assert!(!steps[1].required);

        // "(Required)" is case-insensitive and stripped from the name.
        let enumeration = &workflow.phases[1].steps[0];
        assert!(enumeration.required);
        assert_eq!(enumeration.name, "Brute force directories");
    }

    #[test]
    fn completion_description_is_space_joined_and_type_inferred() {
        let workflow = parse_workflow(SAMPLE).expect("parse");
        let discovery = &workflow.phases[0].completion;
        assert_eq!(discovery.kind, CompletionType::AllRequired);
        assert_eq!(
            discovery.description,
            "All required steps must be complete before moving on."
        );

        let enumeration = &workflow.phases[1].completion;
        assert_eq!(enumeration.kind, CompletionType::AnyBranch);
    }

    #[test]
    fn parses_branches_with_arrow_colon_and_bare_forms() {
        let workflow = parse_workflow(SAMPLE).expect("parse");
        let branches = &workflow.phases[0].branches;
        assert_eq!(branches.len(), 3);
        assert_eq!(branches[0].condition, "web_service_found");
        assert_eq!(branches[0].description, "Investigate the web service");
        assert_eq!(branches[1].condition, "smb_found");
        assert_eq!(branches[1].description, "Investigate SMB shares");
        assert_eq!(branches[2].condition, "dns_wildcard");
        assert_eq!(branches[2].description, "dns_wildcard");
    }

    #[test]
    fn missing_frontmatter_is_a_load_error() {
        assert!(parse_workflow("## Phase: Orphan\n").is_err());
        assert!(parse_workflow("---\nname: x\n").is_err());
    }

    #[test]
    fn unknown_sections_and_preamble_are_ignored() {
        let content = r#"---
name: minimal
---
Free text before any phase is skipped.

## Phase: Only

### Notes
- this section is unknown and ignored

### Steps
- do_thing: Do the thing
"#;
        let workflow = parse_workflow(content).expect("parse");
        assert_eq!(workflow.phases.len(), 1);
        assert_eq!(workflow.phases[0].steps.len(), 1);
    }

    #[test]
    fn empty_phase_list_is_permitted() {
        let workflow = parse_workflow("---\nname: empty\n---\nno phases here\n").expect("parse");
        assert!(workflow.phases.is_empty());
    }

    #[test]
    fn parse_round_trips_a_rendered_workflow() {
        let original = parse_workflow(SAMPLE).expect("parse");

        let mut rendered = String::new();
        rendered.push_str(&format!(
            "---\nname: {}\ndescription: {}\n---\n",
            original.name, original.description
        ));
        for phase in &original.phases {
            rendered.push_str(&format!("\n## Phase: {}\n\n### Steps\n", phase.name));
            for step in &phase.steps {
                let required = if step.required { " (required)" } else { "" };
                rendered.push_str(&format!("- {}: {}{}\n", step.id, step.name, required));
            }
            rendered.push_str("\n### Completion Criteria\n");
            rendered.push_str(&format!("{}\n", phase.completion.description));
            if !phase.branches.is_empty() {
                rendered.push_str("\n### Branches\n");
                for branch in &phase.branches {
                    rendered.push_str(&format!("- {} → {}\n", branch.condition, branch.description));
                }
            }
        }

        let reparsed = parse_workflow(&rendered).expect("reparse");
        assert_eq!(reparsed, original);
    }

    #[tokio::test]
    async fn lookup_prefers_workflows_directory() {
        let base = std::env::temp_dir().join(format!("praxis-workflow-lookup-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(base.join("workflows")).await.expect("mkdir");
        tokio::fs::write(
            base.join("workflows").join("recon.md"),
            "---\nname: from-workflows-dir\n---\n",
        )
        .await
        .expect("write");
        tokio::fs::write(base.join("recon.md"), "---\nname: from-root\n---\n")
            .await
            .expect("write");

        let workflow = load_workflow(&base, "recon").await.expect("load");
        assert_eq!(workflow.name, "from-workflows-dir");

        let missing = load_workflow(&base, "nonexistent").await;
        assert!(missing.is_err());
    }
}
