//! Reparse point resolution along a path.
//!
//! Resolution walks the path one component at a time, asking a lookup
//! function whether the prefix ending at that component is a reparse
//! point. Name-surrogate targets (symlinks and mount points) are spliced
//! into the path: absolute targets replace everything up to and including
//! the component and restart the walk, relative targets are applied to the
//! component's parent directory. Other tags stop the walk and are reported
//! to the caller.

use crate::error::Result;
use crate::status::NtStatus;
use crate::types::{is_separator, ReparseData};
use crate::volume::DEFAULT_MAX_REPARSE_DEPTH;
use std::collections::HashSet;
use tracing::debug;

/// Outcome of one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStatus {
    /// At least one substitution was made and the walk completed.
    Resolved,
    /// No component was a reparse point; the path is returned unchanged.
    NotReparsePoint,
    /// A cycle was detected or the substitution bound was exceeded.
    ReparseLoop,
    /// A substituted target names a path that does not exist.
    BrokenLink,
    /// The lookup failed with the given status.
    LookupFailed(NtStatus),
    /// A reparse point with a tag the resolver does not substitute.
    Foreign { tag: u32 },
}

impl ResolveStatus {
    pub fn to_status(self) -> NtStatus {
        match self {
            ResolveStatus::Resolved | ResolveStatus::Foreign { .. } => NtStatus::Reparse,
            ResolveStatus::NotReparsePoint => NtStatus::NotAReparsePoint,
            ResolveStatus::ReparseLoop => NtStatus::ReparsePointNotResolved,
            ResolveStatus::BrokenLink => NtStatus::ObjectPathNotFound,
            ResolveStatus::LookupFailed(status) => status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: ResolveStatus,
    pub path: String,
    /// Component index of the first reparse point met in the input path.
    pub reparse_index: Option<usize>,
    pub substitutions: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ReparsePointResolver {
    max_depth: u32,
}

impl Default for ReparsePointResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REPARSE_DEPTH)
    }
}

impl ReparsePointResolver {
    pub fn new(max_depth: u32) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Index of the first intermediate component that is a reparse point.
    ///
    /// The final component is not checked. A failing lookup ends the scan
    /// with `None`; the caller's own lookup of the full name reports it.
    pub fn find_reparse_point<F>(&self, path: &str, mut lookup: F) -> Option<usize>
    where
        F: FnMut(&str, bool) -> Result<Option<ReparseData>>,
    {
        let components = split_path(path);
        let intermediate = components.len().saturating_sub(1);
        for index in 0..intermediate {
            match lookup(&join_path(&components[..=index]), true) {
                Ok(Some(_)) => return Some(index),
                Ok(None) => continue,
                Err(_) => return None,
            }
        }
        None
    }

    /// Resolve `path` starting at component `start_index`.
    ///
    /// Components before `start_index` are taken to be ordinary; resuming
    /// from an index returned by an earlier call gives the same result as
    /// starting from 0 as long as the store has not changed.
    pub fn resolve<F>(
        &self,
        path: &str,
        start_index: usize,
        resolve_last_component: bool,
        mut lookup: F,
    ) -> Resolution
    where
        F: FnMut(&str, bool) -> Result<Option<ReparseData>>,
    {
        let mut components = split_path(path);
        let mut index = start_index.min(components.len());
        let mut substitutions = 0u32;
        let mut first_reparse = None;
        let mut visited: HashSet<(String, usize)> = HashSet::new();

        let finish = |status: ResolveStatus,
                      components: &[String],
                      first: Option<usize>,
                      substitutions: u32| Resolution {
            status,
            path: if substitutions == 0 {
                path.to_string()
            } else {
                join_path(components)
            },
            reparse_index: first,
            substitutions,
        };

        while index < components.len() {
            let is_last = index + 1 == components.len();
            if is_last && !resolve_last_component {
                break;
            }
            let prefix = join_path(&components[..=index]);
            let data = match lookup(&prefix, !is_last) {
                Ok(None) => {
                    index += 1;
                    continue;
                }
                Ok(Some(data)) => data,
                Err(err) => {
                    let status = err.status();
                    let broken = substitutions > 0
                        && matches!(
                            status,
                            NtStatus::ObjectNameNotFound | NtStatus::ObjectPathNotFound
                        );
                    let status = if broken {
                        ResolveStatus::BrokenLink
                    } else {
                        ResolveStatus::LookupFailed(status)
                    };
                    return finish(status, &components, first_reparse, substitutions);
                }
            };

            first_reparse.get_or_insert(index);
            if !data.is_name_surrogate() {
                return finish(
                    ResolveStatus::Foreign { tag: data.tag },
                    &components,
                    first_reparse,
                    substitutions,
                );
            }

            let current = join_path(&components);
            if substitutions >= self.max_depth || !visited.insert((current, index)) {
                debug!(
                    path,
                    substitutions,
                    max_depth = self.max_depth,
                    "Reparse loop detected"
                );
                return finish(
                    ResolveStatus::ReparseLoop,
                    &components,
                    first_reparse,
                    substitutions,
                );
            }
            substitutions += 1;

            let rest = components.split_off(index + 1);
            let target = split_path(&data.target);
            if data.target.starts_with(is_separator) {
                components = target;
                index = 0;
            } else {
                components.truncate(index);
                let mut verified = index;
                for part in target {
                    match part.as_str() {
                        "." => {}
                        ".." => {
                            components.pop();
                            verified = verified.min(components.len());
                        }
                        _ => components.push(part),
                    }
                }
                index = verified;
            }
            components.extend(rest);
        }

        let status = if substitutions == 0 {
            ResolveStatus::NotReparsePoint
        } else {
            ResolveStatus::Resolved
        };
        finish(status, &components, first_reparse, substitutions)
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split(is_separator)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_path(components: &[String]) -> String {
    if components.is_empty() {
        return "\\".to_string();
    }
    let mut out = String::new();
    for c in components {
        out.push('\\');
        out.push_str(c);
    }
    out
}
