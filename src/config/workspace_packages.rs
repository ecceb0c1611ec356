use serde::Deserialize;
use std::fs;
use std::path::Path;

/// `package.json::workspaces[]` or `pnpm-workspace.yaml::packages:`
///, used only to derive a `pathPrefix` scope from `workingFile`
/// when the caller didn't specify one.
#[derive(Debug, Clone, Default)]
pub struct WorkspacePackages {
    pub globs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PackageJsonWorkspaces {
    #[serde(default)]
    workspaces: Option<WorkspacesField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorkspacesField {
    List(Vec<String>),
    Object { packages: Vec<String> },
}

#[derive(Debug, Deserialize)]
struct PnpmWorkspaceYaml {
    #[serde(default)]
    packages: Vec<String>,
}

impl WorkspacePackages {
    pub fn load(workspace_root: &Path) -> Self {
        if let Some(pkgs) = Self::from_package_json(workspace_root) {
            return WorkspacePackages { globs: pkgs };
        }
        if let Some(pkgs) = Self::from_pnpm_workspace(workspace_root) {
            return WorkspacePackages { globs: pkgs };
        }
        WorkspacePackages::default()
    }

    fn from_package_json(workspace_root: &Path) -> Option<Vec<String>> {
        let raw = fs::read_to_string(workspace_root.join("package.json")).ok()?;
        let parsed: PackageJsonWorkspaces = serde_json::from_str(&raw).ok()?;
        match parsed.workspaces? {
            WorkspacesField::List(list) => Some(list),
            WorkspacesField::Object { packages } => Some(packages),
        }
    }

    fn from_pnpm_workspace(workspace_root: &Path) -> Option<Vec<String>> {
        let raw = fs::read_to_string(workspace_root.join("pnpm-workspace.yaml")).ok()?;
        let parsed: PnpmWorkspaceYaml = serde_yaml::from_str(&raw).ok()?;
        Some(parsed.packages)
    }

    /// Finds the narrowest configured package glob whose literal prefix
    /// (the portion before the first `*`) contains `relative_path`, and
    /// returns that prefix as a workspace-relative scope.
    pub fn scope_for(&self, relative_path: &str) -> Option<String> {
        self.globs
            .iter()
            .filter_map(|glob| {
                let prefix = glob.split('*').next().unwrap_or(glob).trim_end_matches('/');
                if !prefix.is_empty() && relative_path.starts_with(prefix) {
                    Some(prefix.to_string())
                } else {
                    None
                }
            })
            .max_by_key(|p| p.len())
    }
}
