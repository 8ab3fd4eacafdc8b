use chrono::{DateTime, Utc};
use connector_types::{Acl, FeedItem, InheritanceType, NamedPrincipal};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;

use crate::FeedKind;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("writing feed xml: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// A group and the principals who belong to it, for the groups feed.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupMembership {
    pub group: NamedPrincipal,
    pub members: Vec<connector_types::Principal>,
}

fn rfc822(when: &DateTime<Utc>) -> String {
    when.to_rfc2822()
}

fn write_acl(writer: &mut Writer<Vec<u8>>, acl: &Acl) -> Result<(), EncodeError> {
    if acl.is_empty() && acl.inherit_from().is_none() {
        return Ok(());
    }

    writer.write_event(Event::Start(BytesStart::new("acl")))?;

    for user in acl.effective_permit_users() {
        write_principal(writer, "principal", "user", "permit", user)?;
    }
    for user in acl.deny_users() {
        write_principal(writer, "principal", "user", "deny", user)?;
    }
    for group in acl.effective_permit_groups() {
        write_principal(writer, "principal", "group", "permit", group)?;
    }
    for group in acl.deny_groups() {
        write_principal(writer, "principal", "group", "deny", group)?;
    }

    if let Some(parent) = acl.inherit_from() {
        let mut el = BytesStart::new("inherit-from");
        el.push_attribute(("doc-id", parent.as_str()));
        let kind = match acl.inheritance_type() {
            InheritanceType::Leaf => "leaf",
            InheritanceType::ParentOverrides => "parent-overrides",
            InheritanceType::ChildOverrides => "child-overrides",
            InheritanceType::AndBothPermit => "and-both-permit",
        };
        el.push_attribute(("inheritance-type", kind));
        writer.write_event(Event::Empty(el))?;
    }

    writer.write_event(Event::End(BytesEnd::new("acl")))?;
    Ok(())
}

fn write_principal(
    writer: &mut Writer<Vec<u8>>,
    tag: &str,
    scope: &str,
    access: &str,
    principal: &NamedPrincipal,
) -> Result<(), EncodeError> {
    let mut el = BytesStart::new(tag);
    el.push_attribute(("scope", scope));
    el.push_attribute(("access", access));
    el.push_attribute(("namespace", principal.namespace.as_str()));
    writer.write_event(Event::Start(el))?;
    writer.write_event(Event::Text(BytesText::new(&principal.name)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Encode a metadata-and-url style feed batch (records and standalone
/// ACL items) as the appliance's XML payload. `base_url` is prefixed to
/// each item's escaped `DocId` to form its `url` attribute.
pub fn encode_metadata_and_url_feed(
    datasource: &str,
    feedtype: FeedKind,
    base_url: &str,
    items: &[FeedItem],
) -> Result<Vec<u8>, EncodeError> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer.write_event(Event::Start(BytesStart::new("gsafeed")))?;
    writer.write_event(Event::Start(BytesStart::new("header")))?;
    writer.write_event(Event::Start(BytesStart::new("datasource")))?;
    writer.write_event(Event::Text(BytesText::new(datasource)))?;
    writer.write_event(Event::End(BytesEnd::new("datasource")))?;
    writer.write_event(Event::Start(BytesStart::new("feedtype")))?;
    writer.write_event(Event::Text(BytesText::new(feedtype.as_str())))?;
    writer.write_event(Event::End(BytesEnd::new("feedtype")))?;
    writer.write_event(Event::End(BytesEnd::new("header")))?;

    writer.write_event(Event::Start(BytesStart::new("group")))?;

    for item in items {
        match item {
            FeedItem::Record(record) => {
                let url = record.doc_id().to_url_path(base_url);
                let mut el = BytesStart::new("record");
                el.push_attribute(("url", url.as_str()));
                if record.delete() {
                    el.push_attribute(("action", "delete"));
                }
                if record.crawl_immediately() {
                    el.push_attribute(("crawl-immediately", "true"));
                }
                if record.crawl_once() {
                    el.push_attribute(("crawl-once", "true"));
                }
                if record.lock() {
                    el.push_attribute(("lock", "true"));
                }
                if record.no_follow() {
                    el.push_attribute(("no-follow", "true"));
                }
                let last_modified = record.last_modified().map(rfc822);
                if let Some(lm) = &last_modified {
                    el.push_attribute(("last-modified", lm.as_str()));
                }

                let has_body = record.metadata().is_some() || record.acl().is_some();
                if has_body {
                    writer.write_event(Event::Start(el))?;
                    if let Some(metadata) = record.metadata() {
                        writer.write_event(Event::Start(BytesStart::new("metadata")))?;
                        for (key, value) in metadata.iter_pairs() {
                            let mut meta_el = BytesStart::new("meta");
                            meta_el.push_attribute(("name", key));
                            meta_el.push_attribute(("content", value));
                            writer.write_event(Event::Empty(meta_el))?;
                        }
                        writer.write_event(Event::End(BytesEnd::new("metadata")))?;
                    }
                    if let Some(acl) = record.acl() {
                        write_acl(&mut writer, acl)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new("record")))?;
                } else {
                    writer.write_event(Event::Empty(el))?;
                }
            }
            FeedItem::AclItem(acl_item) => {
                let url = acl_item.doc_id().to_url_path(base_url);
                let mut el = BytesStart::new("record");
                el.push_attribute(("url", url.as_str()));
                writer.write_event(Event::Start(el))?;
                write_acl(&mut writer, acl_item.acl())?;
                writer.write_event(Event::End(BytesEnd::new("record")))?;
            }
        }
    }

    writer.write_event(Event::End(BytesEnd::new("group")))?;
    writer.write_event(Event::End(BytesEnd::new("gsafeed")))?;

    Ok(writer.into_inner())
}

/// Encode a groups feed: one `<membership>` per group, principal
/// children labeled `user`/`group`.
pub fn encode_groups_feed(
    groupsource: &str,
    feedtype: FeedKind,
    memberships: &[GroupMembership],
) -> Result<Vec<u8>, EncodeError> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer.write_event(Event::Start(BytesStart::new("xmlgroups")))?;
    writer.write_event(Event::Start(BytesStart::new("header")))?;
    writer.write_event(Event::Start(BytesStart::new("groupsource")))?;
    writer.write_event(Event::Text(BytesText::new(groupsource)))?;
    writer.write_event(Event::End(BytesEnd::new("groupsource")))?;
    writer.write_event(Event::Start(BytesStart::new("feedtype")))?;
    writer.write_event(Event::Text(BytesText::new(feedtype.as_str())))?;
    writer.write_event(Event::End(BytesEnd::new("feedtype")))?;
    writer.write_event(Event::End(BytesEnd::new("header")))?;

    for membership in memberships {
        writer.write_event(Event::Start(BytesStart::new("membership")))?;
        write_named_principal(&mut writer, "principal", "group", &membership.group)?;
        writer.write_event(Event::Start(BytesStart::new("members")))?;
        for member in &membership.members {
            let (scope, named) = match member {
                connector_types::Principal::User(p) => ("user", p),
                connector_types::Principal::Group(p) => ("group", p),
            };
            write_named_principal(&mut writer, "principal", scope, named)?;
        }
        writer.write_event(Event::End(BytesEnd::new("members")))?;
        writer.write_event(Event::End(BytesEnd::new("membership")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("xmlgroups")))?;

    Ok(writer.into_inner())
}

fn write_named_principal(
    writer: &mut Writer<Vec<u8>>,
    tag: &str,
    scope: &str,
    principal: &NamedPrincipal,
) -> Result<(), EncodeError> {
    let mut el = BytesStart::new(tag);
    el.push_attribute(("scope", scope));
    el.push_attribute(("namespace", principal.namespace.as_str()));
    el.push_attribute(("case-sensitivity-type", "everything-case-sensitive"));
    writer.write_event(Event::Start(el))?;
    writer.write_event(Event::Text(BytesText::new(&principal.name)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use connector_types::{DocId, NamedPrincipal, Principal, Record};

    #[test]
    fn empty_batch_is_a_well_formed_empty_group() {
        let xml = encode_metadata_and_url_feed("src", FeedKind::MetadataAndUrl, "/docs/", &[]).unwrap();
        let text = String::from_utf8(xml).unwrap();
        assert!(text.contains("<datasource>src</datasource>"));
        assert!(text.contains("<feedtype>metadata-and-url</feedtype>"));
        assert!(text.contains("<group></group>") || text.contains("<group/>"));
    }

    #[test]
    fn record_without_body_is_self_closing() {
        let record = Record::builder(DocId::new("a").unwrap()).delete(true).build();
        let xml = encode_metadata_and_url_feed(
            "src",
            FeedKind::Incremental,
            "/docs/",
            &[FeedItem::Record(record)],
        )
        .unwrap();
        let text = String::from_utf8(xml).unwrap();
        assert!(text.contains(r#"url="/docs/a""#));
        assert!(text.contains(r#"action="delete""#));
    }

    #[test]
    fn record_with_metadata_and_acl_nests_blocks() {
        let mut meta = connector_types::Metadata::new();
        meta.add("title", "hello");
        let acl = Acl::builder()
            .permit_user(NamedPrincipal::new("alice"))
            .build();
        let record = Record::builder(DocId::new("a").unwrap())
            .metadata(meta)
            .acl(acl)
            .build();
        let xml = encode_metadata_and_url_feed(
            "src",
            FeedKind::Full,
            "/docs/",
            &[FeedItem::Record(record)],
        )
        .unwrap();
        let text = String::from_utf8(xml).unwrap();
        assert!(text.contains(r#"<meta name="title" content="hello"/>"#));
        assert!(text.contains("alice"));
    }

    #[test]
    fn groups_feed_nests_members_under_membership() {
        let membership = GroupMembership {
            group: NamedPrincipal::new("engineering"),
            members: vec![Principal::User(NamedPrincipal::new("alice"))],
        };
        let xml = encode_groups_feed("src", FeedKind::Full, &[membership]).unwrap();
        let text = String::from_utf8(xml).unwrap();
        assert!(text.contains("engineering"));
        assert!(text.contains("alice"));
        assert!(text.find("<membership>").unwrap() < text.find("<members>").unwrap());
    }
}
