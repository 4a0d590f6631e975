//! Platform repository and its submodules
//!
//! A platform repository embeds one git submodule per service. This module
//! reports what each submodule is checked out at, initialises them, and
//! tags releases.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use git2::{Cred, ErrorCode, FetchOptions, RemoteCallbacks, Repository};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which submodules a command acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Named(Vec<String>),
}

impl Selection {
    /// `all` or a comma separated list of names
    pub fn parse(input: &str) -> Self {
        if input.trim() == "all" {
            return Selection::All;
        }
        Selection::Named(
            input
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

/// Where HEAD points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    Branch(String),
    /// Full SHA of the checked out commit
    Detached(String),
}

impl fmt::Display for HeadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadState::Branch(name) => write!(f, "{name}"),
            HeadState::Detached(sha) => write!(f, "{}", detached_label(sha)),
        }
    }
}

pub fn detached_label(sha: &str) -> String {
    format!("HEAD detached at {sha}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub name: String,
    pub committed: DateTime<Utc>,
}

/// Commits on the local branch missing upstream, and the reverse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divergence {
    pub ahead: usize,
    pub behind: usize,
}

/// Checkout state of one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoStatus {
    pub head: HeadState,
    pub head_sha: String,
    pub tags_at_head: Vec<String>,
    /// Tag whose commit is the most recent
    pub latest_tag: Option<TagInfo>,
    /// Only known on a named branch with an `origin/<branch>` counterpart
    pub divergence: Option<Divergence>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmoduleState {
    /// Declared but not checked out
    NotPresent,
    Present(RepoStatus),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleReport {
    pub name: String,
    pub path: PathBuf,
    pub state: SubmoduleState,
}

/// Find the repository containing `repo_path`, searching parent directories
pub fn discover(repo_path: &Path) -> Result<Repository> {
    if !repo_path.exists() {
        return Err(CoreError::RepoPathNotFound(repo_path.to_path_buf()));
    }
    Ok(Repository::discover(repo_path)?)
}

fn workdir(repo: &Repository) -> Result<&Path> {
    repo.workdir()
        .ok_or_else(|| CoreError::Git(git2::Error::from_str("bare repository has no working tree")))
}

/// Report the state of the selected submodules. Problems with one
/// submodule end up in its report entry instead of failing the whole run.
pub fn version_report(repo_path: &Path, selection: &Selection, fetch: bool) -> Result<Vec<SubmoduleReport>> {
    let repo = discover(repo_path)?;
    let root = workdir(&repo)?;
    let declared: Vec<(String, PathBuf)> = repo
        .submodules()?
        .iter()
        .map(|sm| (sm.name().unwrap_or_default().to_string(), sm.path().to_path_buf()))
        .collect();
    debug!("Declared submodules: {:?}", declared);

    let selected: Vec<(String, Option<PathBuf>)> = match selection {
        Selection::All => declared.into_iter().map(|(n, p)| (n, Some(p))).collect(),
        Selection::Named(names) => names
            .iter()
            .map(|name| {
                let path = declared.iter().find(|(n, _)| n == name).map(|(_, p)| p.clone());
                (name.clone(), path)
            })
            .collect(),
    };

    let mut reports = Vec::with_capacity(selected.len());
    for (name, path) in selected {
        let Some(path) = path else {
            warn!("Submodule {} not found in {}", name, root.display());
            reports.push(SubmoduleReport {
                path: PathBuf::from(&name),
                state: SubmoduleState::Error("not declared in .gitmodules".to_string()),
                name,
            });
            continue;
        };
        let state = match Repository::open(root.join(&path)) {
            Err(e) => {
                debug!("Submodule {} not present: {}", name, e);
                SubmoduleState::NotPresent
            }
            Ok(sub) => match repo_status(&sub, fetch) {
                Ok(status) => SubmoduleState::Present(status),
                Err(e) => {
                    warn!("Error retrieving version of {}: {}", name, e);
                    SubmoduleState::Error(e.to_string())
                }
            },
        };
        reports.push(SubmoduleReport { name, path, state });
    }
    Ok(reports)
}

/// Branch, tags and upstream divergence of one repository. With `fetch`,
/// `origin` is fetched first; fetch failures are only logged.
pub fn repo_status(repo: &Repository, fetch: bool) -> Result<RepoStatus> {
    let head = repo.head()?;
    let head_commit = head.peel_to_commit()?;
    let head_sha = head_commit.id().to_string();

    let branch = if repo.head_detached()? {
        None
    } else {
        head.shorthand().map(str::to_string)
    };

    let mut tags_at_head = Vec::new();
    let mut latest_tag: Option<TagInfo> = None;
    for name in repo.tag_names(None)?.iter().flatten() {
        let commit = match repo
            .revparse_single(&format!("refs/tags/{name}"))
            .and_then(|obj| obj.peel_to_commit())
        {
            Ok(commit) => commit,
            Err(e) => {
                debug!("Skipping tag {}: {}", name, e);
                continue;
            }
        };
        if commit.id() == head_commit.id() {
            tags_at_head.push(name.to_string());
        }
        let committed = DateTime::<Utc>::from_timestamp(commit.time().seconds(), 0).unwrap_or_default();
        if latest_tag.as_ref().is_none_or(|t| committed > t.committed) {
            latest_tag = Some(TagInfo {
                name: name.to_string(),
                committed,
            });
        }
    }

    let divergence = match &branch {
        Some(branch) => {
            if fetch {
                if let Err(e) = fetch_origin(repo, branch) {
                    warn!("Couldn't fetch origin: {}", e);
                }
            }
            divergence(repo, branch, head_commit.id())
        }
        None => None,
    };

    Ok(RepoStatus {
        head: match branch {
            Some(branch) => HeadState::Branch(branch),
            None => HeadState::Detached(head_sha.clone()),
        },
        head_sha,
        tags_at_head,
        latest_tag,
        divergence,
    })
}

fn divergence(repo: &Repository, branch: &str, local: git2::Oid) -> Option<Divergence> {
    let upstream = repo
        .find_reference(&format!("refs/remotes/origin/{branch}"))
        .ok()?
        .peel_to_commit()
        .ok()?;
    let (ahead, behind) = repo.graph_ahead_behind(local, upstream.id()).ok()?;
    Some(Divergence { ahead, behind })
}

fn fetch_origin(repo: &Repository, branch: &str) -> Result<()> {
    let Ok(mut remote) = repo.find_remote("origin") else {
        debug!("No origin remote, skipping fetch");
        return Ok(());
    };

    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|_url, username_from_url, allowed_types| {
        if allowed_types.contains(git2::CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }
        Cred::default()
    });
    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);

    remote.fetch(&[branch], Some(&mut fetch_options), None)?;
    Ok(())
}

/// `git submodule update --init` for the selected submodules. Returns the
/// names that failed along with the reason.
pub fn init_submodules(repo_path: &Path, selection: &Selection) -> Result<Vec<(String, String)>> {
    let repo = discover(repo_path)?;
    let mut failures = Vec::new();
    let mut seen = Vec::new();
    for mut sm in repo.submodules()? {
        let name = sm.name().unwrap_or_default().to_string();
        if let Selection::Named(names) = selection {
            if !names.contains(&name) {
                continue;
            }
        }
        seen.push(name.clone());
        info!("Initializing submodule {}", name);
        if let Err(e) = sm.update(true, None) {
            warn!("Couldn't initialize submodule {}: {}", name, e);
            failures.push((name, e.to_string()));
        }
    }
    if let Selection::Named(names) = selection {
        for name in names.iter().filter(|n| !seen.contains(n)) {
            warn!("Submodule {} not found", name);
            failures.push((name.clone(), "not declared in .gitmodules".to_string()));
        }
    }
    Ok(failures)
}

/// Accept a release version. Valid semver is used as is; `x.y` becomes
/// `x.y.0`; other three-part numeric versions get their patch bumped.
pub fn normalize_version(input: &str) -> Result<String> {
    let input = input.trim();
    if semver::Version::parse(input).is_ok() {
        return Ok(input.to_string());
    }
    let invalid = || CoreError::InvalidVersion(format!("{input} is not a valid version, please use semver"));
    let parts: Vec<&str> = input.split('.').collect();
    if parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
        return Err(invalid());
    }
    match parts.as_slice() {
        [major, minor] => Ok(format!("{major}.{minor}.0")),
        [major, minor, patch] => {
            let patch: u64 = patch.parse().map_err(|_| invalid())?;
            Ok(format!("{major}.{minor}.{}", patch + 1))
        }
        _ => Err(invalid()),
    }
}

/// Tags created by a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTags {
    pub platform: String,
    pub submodule: String,
    pub submodule_sha: String,
}

/// Tag the platform repository `v<version>` at HEAD and the submodule
/// `<name>-v<version>` at the commit it has checked out. Tags that already
/// exist are left as they are.
pub fn release(repo_path: &Path, version: &str, submodule_path: &Path) -> Result<ReleaseTags> {
    let version = normalize_version(version)?;
    let repo = discover(repo_path)?;
    let submodule_name = submodule_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| CoreError::SubmoduleNotFound(submodule_path.display().to_string()))?;

    let declared = repo
        .submodules()?
        .iter()
        .any(|sm| sm.name().is_some_and(|n| n.ends_with(&submodule_name)));
    if !declared {
        return Err(CoreError::SubmoduleNotFound(submodule_name));
    }

    let platform_tag = format!("v{version}");
    let head = repo.head()?.peel_to_commit()?;
    tag(&repo, &platform_tag, head.as_object())?;
    info!("Platform version: {}", platform_tag);

    let sub = Repository::open(workdir(&repo)?.join(submodule_path))?;
    let sub_head = sub.head()?.peel_to_commit()?;
    let submodule_tag = format!("{submodule_name}-{platform_tag}");
    tag(&sub, &submodule_tag, sub_head.as_object())?;
    info!("{} version: {}", submodule_name, platform_tag);

    Ok(ReleaseTags {
        platform: platform_tag,
        submodule: submodule_tag,
        submodule_sha: sub_head.id().to_string(),
    })
}

fn tag(repo: &Repository, name: &str, target: &git2::Object<'_>) -> Result<()> {
    match repo.tag_lightweight(name, target, false) {
        Ok(_) => Ok(()),
        Err(e) if e.code() == ErrorCode::Exists => {
            debug!("Tag {} already exists", name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Commit, Oid, Signature, Time};

    fn commit(repo: &Repository, message: &str, time: i64) -> Oid {
        let sig = Signature::new("Dev", "dev@example.com", &Time::new(time, 0)).unwrap();
        let file = repo.workdir().unwrap().join("README");
        std::fs::write(&file, message).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("README")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let parents: Vec<Commit<'_>> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parents: Vec<&Commit<'_>> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    fn lightweight(repo: &Repository, name: &str, oid: Oid) {
        let object = repo.find_object(oid, None).unwrap();
        repo.tag_lightweight(name, &object, false).unwrap();
    }

    /// Platform repo with `services/api` checked out and `services/web`
    /// declared but missing
    fn platform() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(
            dir.path().join(".gitmodules"),
            "[submodule \"services/api\"]\n\tpath = services/api\n\turl = ../api.git\n\
             [submodule \"services/web\"]\n\tpath = services/web\n\turl = ../web.git\n",
        )
        .unwrap();
        commit(&repo, "platform", 1_000);

        let api = Repository::init(dir.path().join("services/api")).unwrap();
        let first = commit(&api, "first", 1_000);
        lightweight(&api, "v0.1.0", first);
        let second = commit(&api, "second", 2_000);
        lightweight(&api, "v0.2.0", second);
        dir
    }

    #[test]
    fn test_detached_label() {
        assert_eq!(detached_label("abc123"), "HEAD detached at abc123");
        assert_eq!(
            HeadState::Detached("abc123".to_string()).to_string(),
            "HEAD detached at abc123"
        );
    }

    #[test]
    fn test_selection() {
        assert_eq!(Selection::parse("all"), Selection::All);
        assert_eq!(
            Selection::parse("api, web,"),
            Selection::Named(vec!["api".to_string(), "web".to_string()])
        );
    }

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize_version("1.2.3").unwrap(), "1.2.3");
        assert_eq!(normalize_version("1.2.3-rc.1").unwrap(), "1.2.3-rc.1");
        assert_eq!(normalize_version("1.2").unwrap(), "1.2.0");
        assert_eq!(normalize_version("01.2.3").unwrap(), "01.2.4");
        assert!(normalize_version("1").is_err());
        assert!(normalize_version("1.2.3.4").is_err());
        assert!(normalize_version("one.two").is_err());
    }

    #[test]
    fn test_repo_status_on_branch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let first = commit(&repo, "first", 1_000);
        lightweight(&repo, "v0.1.0", first);
        let second = commit(&repo, "second", 2_000);
        lightweight(&repo, "v0.2.0", second);

        let status = repo_status(&repo, true).unwrap();

        assert!(matches!(status.head, HeadState::Branch(_)));
        assert_eq!(status.head_sha, second.to_string());
        assert_eq!(status.tags_at_head, vec!["v0.2.0"]);
        assert_eq!(status.latest_tag.unwrap().name, "v0.2.0");
        // No origin remote
        assert_eq!(status.divergence, None);
    }

    #[test]
    fn test_repo_status_detached() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let first = commit(&repo, "first", 1_000);
        lightweight(&repo, "v0.1.0", first);
        commit(&repo, "second", 2_000);
        repo.set_head_detached(first).unwrap();

        let status = repo_status(&repo, false).unwrap();

        assert_eq!(status.head.to_string(), format!("HEAD detached at {first}"));
        assert_eq!(status.head, HeadState::Detached(status.head_sha.clone()));
        assert_eq!(status.tags_at_head, vec!["v0.1.0"]);
        assert_eq!(status.divergence, None);
    }

    #[test]
    fn test_divergence_against_origin_branch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let base = commit(&repo, "base", 1_000);
        commit(&repo, "local", 2_000);
        let branch = repo.head().unwrap().shorthand().unwrap().to_string();
        repo.reference(&format!("refs/remotes/origin/{branch}"), base, true, "test")
            .unwrap();

        let status = repo_status(&repo, false).unwrap();
        assert_eq!(status.divergence, Some(Divergence { ahead: 1, behind: 0 }));
    }

    #[test]
    fn test_version_report() {
        let dir = platform();

        let reports = version_report(dir.path(), &Selection::All, false).unwrap();

        assert_eq!(reports.len(), 2);
        let api = reports.iter().find(|r| r.name == "services/api").unwrap();
        let SubmoduleState::Present(status) = &api.state else {
            panic!("api should be present: {:?}", api.state);
        };
        assert_eq!(status.latest_tag.as_ref().unwrap().name, "v0.2.0");
        let web = reports.iter().find(|r| r.name == "services/web").unwrap();
        assert_eq!(web.state, SubmoduleState::NotPresent);
    }

    #[test]
    fn test_version_report_unknown_name() {
        let dir = platform();
        let selection = Selection::parse("services/api,services/db");

        let reports = version_report(dir.path(), &selection, false).unwrap();

        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[1].state, SubmoduleState::Error(_)));
    }

    #[test]
    fn test_missing_repo_path() {
        let err = version_report(Path::new("/nonexistent/platform"), &Selection::All, false).unwrap_err();
        assert!(matches!(err, CoreError::RepoPathNotFound(_)));
    }

    #[test]
    fn test_release_tags_both_repos() {
        let dir = platform();

        let tags = release(dir.path(), "1.2", Path::new("services/api")).unwrap();

        assert_eq!(tags.platform, "v1.2.0");
        assert_eq!(tags.submodule, "api-v1.2.0");
        let repo = Repository::open(dir.path()).unwrap();
        assert!(repo.find_reference("refs/tags/v1.2.0").is_ok());
        let api = Repository::open(dir.path().join("services/api")).unwrap();
        let tagged = api
            .find_reference("refs/tags/api-v1.2.0")
            .unwrap()
            .peel_to_commit()
            .unwrap();
        assert_eq!(tagged.id().to_string(), tags.submodule_sha);

        // Releasing again finds the tags in place
        release(dir.path(), "1.2", Path::new("services/api")).unwrap();
    }

    #[test]
    fn test_release_unknown_submodule() {
        let dir = platform();
        let err = release(dir.path(), "1.2.0", Path::new("services/db")).unwrap_err();
        assert!(matches!(err, CoreError::SubmoduleNotFound(_)));
    }
}
