//! Response header encoding for trusted clients (C10): percent-encoded
//! metadata/ACL pairs, outbound anchors, and the robots/security
//! headers the appliance interprets as crawl-time signals.

use connector_adaptor::DocResponse;
use connector_types::{Acl, InheritanceType};
use percent_encoding::{percent_encode, AsciiSet, CONTROLS};

/// Preserve `A-Za-z0-9-_.~`; percent-encode everything else, per the
/// wire protocol's header-encoding rule.
const UNRESERVED: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'!')
    .add(b'"')
    .add(b'#')
    .add(b'$')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

fn encode(value: &str) -> String {
    percent_encode(value.as_bytes(), UNRESERVED).to_string()
}

/// `key=value` pairs, comma-separated and percent-encoded, for every
/// metadata entry.
pub fn format_metadata_header(metadata: &connector_types::Metadata) -> Option<String> {
    if metadata.is_empty() {
        return None;
    }
    Some(
        metadata
            .iter_pairs()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// A second `X-Gsa-External-Metadata` header carrying the ACL using the
/// reserved `google:acl*` keys.
pub fn format_acl_header(acl: &Acl) -> Option<String> {
    if acl.is_empty() && acl.inherit_from().is_none() {
        return None;
    }

    let mut pairs: Vec<String> = Vec::new();
    let join = |principals: &[connector_types::NamedPrincipal]| {
        principals
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    };

    if !acl.effective_permit_users().is_empty() {
        pairs.push(format!("google:aclusers={}", encode(&join(acl.effective_permit_users()))));
    }
    if !acl.effective_permit_groups().is_empty() {
        pairs.push(format!("google:aclgroups={}", encode(&join(acl.effective_permit_groups()))));
    }
    if !acl.deny_users().is_empty() {
        pairs.push(format!("google:acldenyusers={}", encode(&join(acl.deny_users()))));
    }
    if !acl.deny_groups().is_empty() {
        pairs.push(format!("google:acldenygroups={}", encode(&join(acl.deny_groups()))));
    }
    if let Some(parent) = acl.inherit_from() {
        pairs.push(format!("google:aclinheritfrom={}", encode(parent.as_str())));
        let kind = match acl.inheritance_type() {
            InheritanceType::Leaf => "leaf",
            InheritanceType::ParentOverrides => "parent-overrides",
            InheritanceType::ChildOverrides => "child-overrides",
            InheritanceType::AndBothPermit => "and-both-permit",
        };
        pairs.push(format!("google:aclinheritancetype={}", encode(kind)));
    }

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join(","))
    }
}

/// `text=url` (or bare `url` when no text), comma-separated and
/// percent-encoded, for the `X-Gsa-External-Anchor` header.
pub fn format_anchor_header(anchors: &[(Option<String>, String)]) -> Option<String> {
    if anchors.is_empty() {
        return None;
    }
    Some(
        anchors
            .iter()
            .map(|(text, url)| match text {
                Some(text) => format!("{}={}", encode(text), encode(url)),
                None => encode(url),
            })
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// `noindex`, `nofollow`, `noarchive`, space-separated, for whichever
/// of those the adaptor set; `None` if it set none of them.
pub fn format_robots_tag(response: &DocResponse) -> Option<String> {
    let mut tags = Vec::new();
    if response.no_index() {
        tags.push("noindex");
    }
    if response.no_follow() {
        tags.push("nofollow");
    }
    if response.no_archive() {
        tags.push("noarchive");
    }
    if tags.is_empty() {
        None
    } else {
        Some(tags.join(", "))
    }
}
