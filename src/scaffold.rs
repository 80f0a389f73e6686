//! Pinned scaffold resources and the static document an isolated session
//! populates.
//!
//! Every script an isolated session may load is listed here with an
//! SRI-style `sha256-<base64>` pin. Embedded copies are the default; a
//! deployment directory may replace them, but only with byte-identical files.

use crate::styling::generate_css_for_nodes;
use crate::ui::{escape_attr, render_html, UiNode};
use anyhow::{anyhow, Error};
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// Base URL all scaffold modules resolve under
pub const SCAFFOLD_ROOT: &str = "file:///scaffold/";

/// Module evaluated first in every session
pub const ENTRY_MODULE: &str = "isolated_entry.js";

#[derive(Debug, Clone, Copy)]
pub struct PinnedResource {
    pub name: &'static str,
    pub integrity: &'static str,
    embedded: &'static str,
}

pub const PINNED: &[PinnedResource] = &[
    PinnedResource {
        name: "ui_runtime.js",
        integrity: "sha256-kjcRpYLX00mUIy1ztpf/VDruCK6NmbHAD1OdXpWIsVs=",
        embedded: include_str!("js/ui_runtime.js"),
    },
    PinnedResource {
        name: ENTRY_MODULE,
        integrity: "sha256-QY8+NmoXSWFn/AmdUkdUznlXz1SR6B2v3uRdKSyVSNc=",
        embedded: include_str!("js/isolated_entry.js"),
    },
];

pub fn pinned(name: &str) -> Option<&'static PinnedResource> {
    PINNED.iter().find(|resource| resource.name == name)
}

/// SRI-style integrity string for `bytes`.
pub fn integrity_of(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!(
        "sha256-{}",
        base64::engine::general_purpose::STANDARD.encode(digest)
    )
}

/// Verified sources of every pinned resource, ready to be served.
#[derive(Debug, Clone)]
pub struct ResourceSet {
    sources: HashMap<&'static str, String>,
}

impl ResourceSet {
    /// Embedded copies, verified against their pins.
    pub fn embedded() -> Result<Self, Error> {
        Self::load(None)
    }

    /// Load from `dir` when given, otherwise the embedded copies. Any file
    /// whose digest differs from its pin fails the whole set.
    pub fn load(dir: Option<&Path>) -> Result<Self, Error> {
        let mut sources = HashMap::new();
        for resource in PINNED {
            let source = match dir {
                Some(dir) => {
                    let path = dir.join(resource.name);
                    std::fs::read_to_string(&path).map_err(|e| {
                        anyhow!("Failed to read pinned resource '{}': {}", path.display(), e)
                    })?
                }
                None => resource.embedded.to_string(),
            };

            let actual = integrity_of(source.as_bytes());
            if actual != resource.integrity {
                return Err(anyhow!(
                    "Integrity mismatch for '{}': expected {}, got {}",
                    resource.name,
                    resource.integrity,
                    actual
                ));
            }
            sources.insert(resource.name, source);
        }
        Ok(Self { sources })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.sources.get(name).map(String::as_str)
    }
}

const BASE_CSS: &str = "\
body { margin: 0; font-family: ui-sans-serif, system-ui, sans-serif; }
.sandbox-error { margin: 1rem; padding: 1rem; border: 1px solid #fca5a5; border-radius: 0.5rem; background: #fef2f2; color: #991b1b; }
.sandbox-error h3 { margin: 0 0 0.5rem; font-size: 1rem; }
.sandbox-error pre { margin: 0; white-space: pre-wrap; font-size: 0.875rem; }
.component-placeholder { padding: 1rem; color: #4b5563; }
";

/// The populated scaffold document for one session.
pub fn build_document(session: &Uuid, nodes: &[UiNode]) -> String {
    let pins: Vec<String> = PINNED
        .iter()
        .map(|r| format!("{} {}", r.name, r.integrity))
        .collect();

    format!(
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <meta name=\"scaffold-resources\" content=\"{}\">\n\
         <title>Component preview</title>\n\
         <style>\n{}{}</style>\n\
         </head>\n\
         <body>\n\
         <div id=\"root\" data-session=\"{}\">{}</div>\n\
         </body>\n\
         </html>\n",
        escape_attr(&pins.join("; ")),
        BASE_CSS,
        generate_css_for_nodes(nodes),
        session,
        render_html(nodes)
    )
}
