//! metallb address pool manifests
//!
//! Two manifest shapes exist, picked by the chart's major version:
//!
//! - **3.x**: a `ConfigMap` whose `data.config` is itself a YAML document
//!   listing `address-pools`
//! - **4.x and later**: a multi-document list of CRDs where the
//!   `IPAddressPool` documents carry `spec.addresses`
//!
//! Rendering never touches the template file; the result is a new string.

use crate::error::{CoreError, Result};
use crate::network::AddressPool;
use serde_yaml::{Mapping, Value};
use std::borrow::Cow;
use std::path::Path;

const LEGACY_TEMPLATE: &str = include_str!("../templates/metallb-configmap.yaml");
const CRD_TEMPLATE: &str = include_str!("../templates/metallb-crd.yaml");

/// Manifest shape for a chart version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// `ConfigMap` with an embedded config document
    Legacy,
    /// `IPAddressPool` custom resources
    Crd,
}

impl TemplateKind {
    /// `None` when the major version has no known manifest shape
    pub fn for_version(version: &str) -> Option<Self> {
        let major: u64 = version
            .trim()
            .trim_start_matches('v')
            .split('.')
            .next()?
            .parse()
            .ok()?;
        match major {
            3 => Some(TemplateKind::Legacy),
            m if m >= 4 => Some(TemplateKind::Crd),
            _ => None,
        }
    }

    /// Template text from `path`, or the built-in one
    pub fn load(&self, path: Option<&Path>) -> Result<Cow<'static, str>> {
        match path {
            Some(path) => Ok(Cow::Owned(std::fs::read_to_string(path)?)),
            None => Ok(Cow::Borrowed(match self {
                TemplateKind::Legacy => LEGACY_TEMPLATE,
                TemplateKind::Crd => CRD_TEMPLATE,
            })),
        }
    }

    pub fn render(&self, template: &str, pool: &AddressPool) -> Result<String> {
        match self {
            TemplateKind::Legacy => render_legacy(template, pool),
            TemplateKind::Crd => render_crd(template, pool),
        }
    }
}

fn pool_value(pool: &AddressPool) -> Value {
    Value::Sequence(vec![Value::String(pool.to_string())])
}

/// Replace the addresses of every pool in `data.config`. The `addresses`
/// key is moved last so the rendered config ends with the pool.
pub fn render_legacy(template: &str, pool: &AddressPool) -> Result<String> {
    let mut doc: Value = serde_yaml::from_str(template)?;
    let config = doc
        .get("data")
        .and_then(|d| d.get("config"))
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::InvalidTemplate("missing data.config".to_string()))?;

    let mut inner: Value = serde_yaml::from_str(config)?;
    let pools = inner
        .get_mut("address-pools")
        .and_then(Value::as_sequence_mut)
        .ok_or_else(|| CoreError::InvalidTemplate("missing address-pools in data.config".to_string()))?;
    for entry in pools.iter_mut() {
        let Some(entry) = entry.as_mapping_mut() else {
            continue;
        };
        entry.remove("addresses");
        entry.insert(Value::from("addresses"), pool_value(pool));
    }
    let rendered_config = serde_yaml::to_string(&inner)?;

    if let Some(data) = doc.get_mut("data").and_then(Value::as_mapping_mut) {
        data.insert(Value::from("config"), Value::String(rendered_config));
    }
    Ok(serde_yaml::to_string(&doc)?)
}

/// Set `spec.addresses` on every `IPAddressPool` document. Other documents
/// and the separators are copied through untouched.
pub fn render_crd(template: &str, pool: &AddressPool) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut patched = 0usize;
    for segment in split_documents(template) {
        match segment {
            Segment::Separator(line) => rendered.push_str(line),
            Segment::Document(text) if text.trim().is_empty() => rendered.push_str(text),
            Segment::Document(text) => {
                let doc: Value = serde_yaml::from_str(text)?;
                if doc.get("kind").and_then(Value::as_str) != Some("IPAddressPool") {
                    rendered.push_str(text);
                    continue;
                }
                rendered.push_str(&patch_address_pool(doc, pool)?);
                patched += 1;
            }
        }
    }
    if patched == 0 {
        return Err(CoreError::InvalidTemplate(
            "no IPAddressPool document found".to_string(),
        ));
    }
    Ok(rendered)
}

fn patch_address_pool(mut doc: Value, pool: &AddressPool) -> Result<String> {
    let root = doc
        .as_mapping_mut()
        .ok_or_else(|| CoreError::InvalidTemplate("IPAddressPool is not a mapping".to_string()))?;
    let spec = root
        .entry(Value::from("spec"))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    let spec = spec
        .as_mapping_mut()
        .ok_or_else(|| CoreError::InvalidTemplate("IPAddressPool spec is not a mapping".to_string()))?;
    spec.insert(Value::from("addresses"), pool_value(pool));
    Ok(serde_yaml::to_string(&doc)?)
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    /// A `---` line, newline included
    Separator(&'a str),
    Document(&'a str),
}

/// Split multi-document YAML on `---` lines, keeping every byte
fn split_documents(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut doc_start = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_end() == "---" {
            if offset > doc_start {
                segments.push(Segment::Document(&text[doc_start..offset]));
            }
            segments.push(Segment::Separator(line));
            doc_start = offset + line.len();
        }
        offset += line.len();
    }
    if text.len() > doc_start && !text[doc_start..].trim().is_empty() {
        segments.push(Segment::Document(&text[doc_start..]));
    } else if text.len() > doc_start {
        // Trailing whitespace after the last separator
        segments.push(Segment::Separator(&text[doc_start..]));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn pool() -> AddressPool {
        AddressPool {
            start: Ipv4Addr::new(172, 18, 255, 245),
            end: Ipv4Addr::new(172, 18, 255, 254),
        }
    }

    #[test]
    fn test_template_for_version() {
        assert_eq!(TemplateKind::for_version("3.0.12"), Some(TemplateKind::Legacy));
        assert_eq!(TemplateKind::for_version("4.6.0"), Some(TemplateKind::Crd));
        assert_eq!(TemplateKind::for_version("6.1.0"), Some(TemplateKind::Crd));
        assert_eq!(TemplateKind::for_version("2.5.0"), None);
        assert_eq!(TemplateKind::for_version("latest"), None);
    }

    #[test]
    fn test_legacy_config_ends_with_pool() {
        let rendered = render_legacy(LEGACY_TEMPLATE, &pool()).unwrap();

        let doc: Value = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(doc["kind"].as_str(), Some("ConfigMap"));
        let config = doc["data"]["config"].as_str().unwrap();
        let last_line = config.trim_end().lines().last().unwrap();
        assert!(
            last_line.ends_with("172.18.255.245 - 172.18.255.254"),
            "last line was {last_line:?}"
        );

        let inner: Value = serde_yaml::from_str(config).unwrap();
        let addresses = &inner["address-pools"][0]["addresses"];
        assert_eq!(addresses.as_sequence().unwrap().len(), 1);
        assert_eq!(inner["address-pools"][0]["protocol"].as_str(), Some("layer2"));
    }

    #[test]
    fn test_legacy_render_matches_golden() {
        let rendered = render_legacy(LEGACY_TEMPLATE, &pool()).unwrap();
        assert_eq!(
            rendered,
            include_str!("../testdata/metallb-configmap.rendered.yaml")
        );

        let doc: Value = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(
            doc["data"]["config"].as_str(),
            Some(
                "address-pools:\n\
                 - name: default\n\
                 \x20 protocol: layer2\n\
                 \x20 addresses:\n\
                 \x20 - 172.18.255.245 - 172.18.255.254\n"
            )
        );
    }

    #[test]
    fn test_legacy_without_config_rejected() {
        let err = render_legacy("kind: ConfigMap\ndata: {}\n", &pool()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTemplate(_)));
    }

    #[test]
    fn test_crd_only_pool_document_changes() {
        let rendered = render_crd(CRD_TEMPLATE, &pool()).unwrap();

        let (_, advert_in) = CRD_TEMPLATE.split_once("---\n").unwrap();
        let (pool_out, advert_out) = rendered.split_once("---\n").unwrap();
        assert_eq!(advert_in, advert_out);

        let doc: Value = serde_yaml::from_str(pool_out).unwrap();
        assert_eq!(
            doc["spec"]["addresses"][0].as_str(),
            Some("172.18.255.245 - 172.18.255.254")
        );
        assert_eq!(doc["metadata"]["name"].as_str(), Some("default-pool"));
    }

    #[test]
    fn test_crd_patches_every_pool() {
        let template = "\
kind: L2Advertisement
metadata:
  name: first   # kept as written
---
kind: IPAddressPool
metadata:
  name: a
---
kind: IPAddressPool
metadata:
  name: b
spec:
  autoAssign: false
";
        let rendered = render_crd(template, &pool()).unwrap();
        assert!(rendered.starts_with("kind: L2Advertisement\nmetadata:\n  name: first   # kept as written\n---\n"));

        let docs: Vec<&str> = rendered.split("---\n").collect();
        assert_eq!(docs.len(), 3);
        for doc in &docs[1..] {
            let value: Value = serde_yaml::from_str(doc).unwrap();
            assert_eq!(value["spec"]["addresses"].as_sequence().unwrap().len(), 1);
        }
        let b: Value = serde_yaml::from_str(docs[2]).unwrap();
        assert_eq!(b["spec"]["autoAssign"].as_bool(), Some(false));
    }

    #[test]
    fn test_crd_without_pool_rejected() {
        let err = render_crd("kind: L2Advertisement\n", &pool()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTemplate(_)));
    }

    #[test]
    fn test_split_keeps_every_byte() {
        let text = "a: 1\n---\nb: 2\n--- \nc: 3";
        let joined: String = split_documents(text)
            .into_iter()
            .map(|s| match s {
                Segment::Separator(t) | Segment::Document(t) => t,
            })
            .collect();
        assert_eq!(joined, text);
    }
}
