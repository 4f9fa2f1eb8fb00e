//! PermissionRegistry - Static role capability table

use serde::Serialize;
use shared::{DataDomain, NotificationCategory, Role};
use std::collections::{BTreeSet, HashMap};

/// What a single role may read, receive and report on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSet {
    pub readable_domains: BTreeSet<DataDomain>,
    pub notification_categories: BTreeSet<NotificationCategory>,
    pub report_domains: BTreeSet<DataDomain>,
}

impl PermissionSet {
    /// The most restrictive profile: nothing readable, nothing receivable
    pub fn restricted() -> Self {
        Self::default()
    }

    /// Builder: readable domains
    pub fn with_domains(mut self, domains: &[DataDomain]) -> Self {
        self.readable_domains.extend(domains.iter().copied());
        self
    }

    /// Builder: receivable notification categories
    pub fn with_categories(mut self, categories: &[NotificationCategory]) -> Self {
        self.notification_categories.extend(categories.iter().copied());
        self
    }

    /// Builder: queryable report domains
    pub fn with_report_domains(mut self, domains: &[DataDomain]) -> Self {
        self.report_domains.extend(domains.iter().copied());
        self
    }

    pub fn allows(&self, domain: DataDomain) -> bool {
        self.readable_domains.contains(&domain)
    }
}

/// PermissionRegistry maps every role to its `PermissionSet`.
///
/// Built once; never mutated after construction. Lookups for roles absent
/// from the table resolve to `PermissionSet::restricted()`.
#[derive(Debug, Clone)]
pub struct PermissionRegistry {
    profiles: HashMap<Role, PermissionSet>,
    restricted: PermissionSet,
}

impl PermissionRegistry {
    /// Registry with the built-in restaurant profiles
    pub fn new() -> Self {
        use DataDomain as D;
        use NotificationCategory as C;

        let mut profiles = HashMap::new();

        profiles.insert(
            Role::Owner,
            PermissionSet::default()
                .with_domains(D::all())
                .with_categories(C::all())
                .with_report_domains(D::stored()),
        );
        profiles.insert(
            Role::Admin,
            PermissionSet::default()
                .with_domains(&[
                    D::Orders,
                    D::Inventory,
                    D::Tables,
                    D::Notifications,
                    D::Production,
                    D::Reports,
                    D::Financial,
                ])
                .with_categories(&[C::Orders, C::Inventory, C::Production, C::Tables, C::System])
                .with_report_domains(&[D::Orders, D::Inventory, D::Production, D::Tables]),
        );
        profiles.insert(
            Role::Baker,
            PermissionSet::default()
                .with_domains(&[D::Orders, D::Inventory, D::Production, D::Notifications, D::Reports])
                .with_categories(&[C::Orders, C::Inventory, C::Production])
                .with_report_domains(&[D::Inventory, D::Production]),
        );
        profiles.insert(
            Role::Waiter,
            PermissionSet::default()
                .with_domains(&[D::Orders, D::Tables, D::Notifications])
                .with_categories(&[C::Orders, C::Tables]),
        );
        profiles.insert(
            Role::Employee,
            PermissionSet::default()
                .with_domains(&[D::Orders, D::Inventory, D::Notifications])
                .with_categories(&[C::Orders, C::Inventory, C::System]),
        );
        profiles.insert(
            Role::Customer,
            PermissionSet::default()
                .with_domains(&[D::Orders, D::Notifications])
                .with_categories(&[C::Orders]),
        );

        Self::from_profiles(profiles)
    }

    /// Registry from an explicit table
    pub fn from_profiles(profiles: HashMap<Role, PermissionSet>) -> Self {
        Self {
            profiles,
            restricted: PermissionSet::restricted(),
        }
    }

    /// Profile for a role
    pub fn profile(&self, role: Role) -> &PermissionSet {
        self.profiles.get(&role).unwrap_or(&self.restricted)
    }

    /// Profile for a role name; unparseable names get the restricted profile
    pub fn profile_named(&self, role: &str) -> &PermissionSet {
        match role.parse::<Role>() {
            Ok(role) => self.profile(role),
            Err(_) => &self.restricted,
        }
    }

    /// Check if a role may read a domain
    pub fn allows(&self, role: Role, domain: DataDomain) -> bool {
        self.profile(role).allows(domain)
    }

    /// Check if a role name may read a domain
    pub fn allows_named(&self, role: &str, domain: DataDomain) -> bool {
        self.profile_named(role).allows(domain)
    }

    pub fn allowed_domains(&self, role: Role) -> &BTreeSet<DataDomain> {
        &self.profile(role).readable_domains
    }

    pub fn allowed_notification_categories(&self, role: Role) -> &BTreeSet<NotificationCategory> {
        &self.profile(role).notification_categories
    }

    pub fn allowed_report_domains(&self, role: Role) -> &BTreeSet<DataDomain> {
        &self.profile(role).report_domains
    }

    /// Check if a notification of `category` may be delivered to `role`
    pub fn can_receive(&self, role: Role, category: NotificationCategory) -> bool {
        self.profile(role).notification_categories.contains(&category)
    }

    /// Roles that can read a domain
    pub fn roles_with_access(&self, domain: DataDomain) -> Vec<Role> {
        Role::all()
            .iter()
            .copied()
            .filter(|r| self.allows(*r, domain))
            .collect()
    }
}

impl Default for PermissionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============== Built-in Table Tests ==============

    #[test]
    fn test_owner_reads_everything() {
        let registry = PermissionRegistry::new();
        for domain in DataDomain::all() {
            assert!(registry.allows(Role::Owner, *domain), "owner denied {}", domain);
        }
        assert_eq!(
            registry.allowed_notification_categories(Role::Owner).len(),
            NotificationCategory::all().len()
        );
    }

    #[test]
    fn test_customer_profile() {
        let registry = PermissionRegistry::new();

        assert!(registry.allows(Role::Customer, DataDomain::Orders));
        assert!(registry.allows(Role::Customer, DataDomain::Notifications));
        assert!(!registry.allows(Role::Customer, DataDomain::Financial));
        assert!(!registry.allows(Role::Customer, DataDomain::Inventory));
        assert!(registry.allowed_report_domains(Role::Customer).is_empty());
        assert!(registry.can_receive(Role::Customer, NotificationCategory::Orders));
        assert!(!registry.can_receive(Role::Customer, NotificationCategory::Inventory));
    }

    #[test]
    fn test_financial_access_limited_to_management() {
        let registry = PermissionRegistry::new();
        assert_eq!(
            registry.roles_with_access(DataDomain::Financial),
            vec![Role::Owner, Role::Admin]
        );
    }

    #[test]
    fn test_baker_reports() {
        let registry = PermissionRegistry::new();
        let reports = registry.allowed_report_domains(Role::Baker);
        assert!(reports.contains(&DataDomain::Production));
        assert!(!reports.contains(&DataDomain::Orders));
    }

    #[test]
    fn test_reports_never_include_reports() {
        let registry = PermissionRegistry::new();
        for role in Role::all() {
            assert!(!registry.allowed_report_domains(*role).contains(&DataDomain::Reports));
        }
    }

    // ============== Restrictive Fallback Tests ==============

    #[test]
    fn test_unknown_role_name_is_restricted() {
        let registry = PermissionRegistry::new();
        for domain in DataDomain::all() {
            assert!(!registry.allows_named("manager", *domain));
        }
        assert_eq!(registry.profile_named("manager"), &PermissionSet::restricted());
    }

    #[test]
    fn test_known_role_name_resolves() {
        let registry = PermissionRegistry::new();
        assert!(registry.allows_named("Waiter", DataDomain::Tables));
    }

    #[test]
    fn test_missing_role_in_custom_table() {
        let mut profiles = HashMap::new();
        profiles.insert(
            Role::Owner,
            PermissionSet::default().with_domains(&[DataDomain::Orders]),
        );
        let registry = PermissionRegistry::from_profiles(profiles);

        assert!(registry.allows(Role::Owner, DataDomain::Orders));
        assert!(!registry.allows(Role::Owner, DataDomain::Tables));
        assert!(!registry.allows(Role::Admin, DataDomain::Orders));
        assert!(registry.allowed_notification_categories(Role::Admin).is_empty());
    }

    #[test]
    fn test_permission_set_serializes() {
        let registry = PermissionRegistry::new();
        let json = serde_json::to_value(registry.profile(Role::Waiter)).unwrap();
        assert_eq!(json["readableDomains"], serde_json::json!(["orders", "tables", "notifications"]));
    }
}
