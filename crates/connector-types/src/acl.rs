use crate::doc_id::DocId;

/// The namespace principals are compared within when none is given
/// explicitly.
pub const DEFAULT_NAMESPACE: &str = "Default";

/// A named principal: a user or group name plus the namespace it lives
/// in. Comparison is case-sensitive on both fields.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamedPrincipal {
    pub name: String,
    pub namespace: String,
}

impl NamedPrincipal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn with_namespace(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

/// A principal referenced by an `Acl`: either a user or a group.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Principal {
    User(NamedPrincipal),
    Group(NamedPrincipal),
}

impl Principal {
    pub fn named(&self) -> &NamedPrincipal {
        match self {
            Principal::User(p) | Principal::Group(p) => p,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InheritanceType {
    Leaf,
    ParentOverrides,
    ChildOverrides,
    AndBothPermit,
}

impl Default for InheritanceType {
    fn default() -> Self {
        InheritanceType::Leaf
    }
}

/// An immutable set of permissions attached to a `Record` or `AclItem`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Acl {
    permit_users: Vec<NamedPrincipal>,
    deny_users: Vec<NamedPrincipal>,
    permit_groups: Vec<NamedPrincipal>,
    deny_groups: Vec<NamedPrincipal>,
    inherit_from: Option<DocId>,
    inheritance_type: InheritanceType,
}

impl Acl {
    pub fn builder() -> AclBuilder {
        AclBuilder::default()
    }

    pub fn permit_users(&self) -> &[NamedPrincipal] {
        &self.permit_users
    }

    pub fn deny_users(&self) -> &[NamedPrincipal] {
        &self.deny_users
    }

    pub fn permit_groups(&self) -> &[NamedPrincipal] {
        &self.permit_groups
    }

    pub fn deny_groups(&self) -> &[NamedPrincipal] {
        &self.deny_groups
    }

    /// Convenience alias over `permit_users`, used by the feed encoder
    /// and by tests that don't care about the inheritance graph.
    pub fn effective_permit_users(&self) -> &[NamedPrincipal] {
        self.permit_users()
    }

    /// Convenience alias over `permit_groups`.
    pub fn effective_permit_groups(&self) -> &[NamedPrincipal] {
        self.permit_groups()
    }

    pub fn inherit_from(&self) -> Option<&DocId> {
        self.inherit_from.as_ref()
    }

    pub fn inheritance_type(&self) -> InheritanceType {
        self.inheritance_type
    }

    pub fn is_empty(&self) -> bool {
        self.permit_users.is_empty()
            && self.deny_users.is_empty()
            && self.permit_groups.is_empty()
            && self.deny_groups.is_empty()
    }
}

#[derive(Default)]
pub struct AclBuilder {
    acl: Acl,
}

impl AclBuilder {
    pub fn permit_user(mut self, p: NamedPrincipal) -> Self {
        self.acl.permit_users.push(p);
        self
    }

    pub fn deny_user(mut self, p: NamedPrincipal) -> Self {
        self.acl.deny_users.push(p);
        self
    }

    pub fn permit_group(mut self, p: NamedPrincipal) -> Self {
        self.acl.permit_groups.push(p);
        self
    }

    pub fn deny_group(mut self, p: NamedPrincipal) -> Self {
        self.acl.deny_groups.push(p);
        self
    }

    pub fn inherit_from(mut self, parent: DocId) -> Self {
        self.acl.inherit_from = Some(parent);
        self
    }

    pub fn inheritance_type(mut self, kind: InheritanceType) -> Self {
        self.acl.inheritance_type = kind;
        self
    }

    pub fn build(self) -> Acl {
        self.acl
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn principal_equality_is_case_sensitive() {
        let a = NamedPrincipal::new("Alice");
        let b = NamedPrincipal::new("alice");
        assert_ne!(a, b);
        assert_eq!(a.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn builder_roundtrips_fields() {
        let acl = Acl::builder()
            .permit_user(NamedPrincipal::new("alice"))
            .deny_group(NamedPrincipal::with_namespace("eng", "ldap"))
            .inherit_from(DocId::new("parent").unwrap())
            .inheritance_type(InheritanceType::AndBothPermit)
            .build();

        assert_eq!(acl.effective_permit_users(), &[NamedPrincipal::new("alice")]);
        assert_eq!(acl.deny_groups(), &[NamedPrincipal::with_namespace("eng", "ldap")]);
        assert_eq!(acl.inherit_from().unwrap().as_str(), "parent");
        assert_eq!(acl.inheritance_type(), InheritanceType::AndBothPermit);
        assert!(!acl.is_empty());
    }

    #[test]
    fn default_acl_is_empty_leaf() {
        let acl = Acl::default();
        assert!(acl.is_empty());
        assert_eq!(acl.inheritance_type(), InheritanceType::Leaf);
        assert!(acl.inherit_from().is_none());
    }
}
