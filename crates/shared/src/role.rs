//! Role and domain identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operator identity class. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Baker,
    Waiter,
    Employee,
    Customer,
}

impl Role {
    /// All roles, most privileged first
    pub fn all() -> &'static [Role] {
        &[
            Role::Owner,
            Role::Admin,
            Role::Baker,
            Role::Waiter,
            Role::Employee,
            Role::Customer,
        ]
    }

    /// Lowercase identifier used in config files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Baker => "baker",
            Role::Waiter => "waiter",
            Role::Employee => "employee",
            Role::Customer => "customer",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Owner => "Owner",
            Role::Admin => "Administrator",
            Role::Baker => "Baker",
            Role::Waiter => "Waiter",
            Role::Employee => "Employee",
            Role::Customer => "Customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role name does not match any known role
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Role::all()
            .iter()
            .copied()
            .find(|r| r.as_str() == needle)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Named category of application data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataDomain {
    Orders,
    Inventory,
    Tables,
    Notifications,
    Financial,
    Production,
    Reports,
}

impl DataDomain {
    pub fn all() -> &'static [DataDomain] {
        &[
            DataDomain::Orders,
            DataDomain::Inventory,
            DataDomain::Tables,
            DataDomain::Notifications,
            DataDomain::Financial,
            DataDomain::Production,
            DataDomain::Reports,
        ]
    }

    /// Domains backed directly by a store collection. Reports are derived.
    pub fn stored() -> &'static [DataDomain] {
        &[
            DataDomain::Orders,
            DataDomain::Inventory,
            DataDomain::Tables,
            DataDomain::Notifications,
            DataDomain::Financial,
            DataDomain::Production,
        ]
    }

    /// Domains the scheduler forces a resync for
    pub fn watched() -> &'static [DataDomain] {
        &[
            DataDomain::Orders,
            DataDomain::Notifications,
            DataDomain::Inventory,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataDomain::Orders => "orders",
            DataDomain::Inventory => "inventory",
            DataDomain::Tables => "tables",
            DataDomain::Notifications => "notifications",
            DataDomain::Financial => "financial",
            DataDomain::Production => "production",
            DataDomain::Reports => "reports",
        }
    }
}

impl fmt::Display for DataDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        DataDomain::all()
            .iter()
            .copied()
            .find(|d| d.as_str() == needle)
            .ok_or_else(|| format!("Unknown data domain '{}'", s))
    }
}

/// Category a notification is published under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Orders,
    Inventory,
    Production,
    Tables,
    Financial,
    System,
}

impl NotificationCategory {
    pub fn all() -> &'static [NotificationCategory] {
        &[
            NotificationCategory::Orders,
            NotificationCategory::Inventory,
            NotificationCategory::Production,
            NotificationCategory::Tables,
            NotificationCategory::Financial,
            NotificationCategory::System,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Orders => "orders",
            NotificationCategory::Inventory => "inventory",
            NotificationCategory::Production => "production",
            NotificationCategory::Tables => "tables",
            NotificationCategory::Financial => "financial",
            NotificationCategory::System => "system",
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============== Role Tests ==============

    #[test]
    fn test_role_parse_case_insensitive() {
        assert_eq!("Owner".parse::<Role>().unwrap(), Role::Owner);
        assert_eq!(" baker ".parse::<Role>().unwrap(), Role::Baker);
        assert_eq!("CUSTOMER".parse::<Role>().unwrap(), Role::Customer);
    }

    #[test]
    fn test_role_parse_unknown() {
        let err = "manager".parse::<Role>().unwrap_err();
        assert_eq!(err, UnknownRole("manager".to_string()));
        assert_eq!(err.to_string(), "Unknown role 'manager'");
    }

    #[test]
    fn test_role_display_roundtrip() {
        for role in Role::all() {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), *role);
        }
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Waiter).unwrap();
        assert_eq!(json, "\"waiter\"");
    }

    // ============== DataDomain Tests ==============

    #[test]
    fn test_stored_domains_exclude_reports() {
        assert!(!DataDomain::stored().contains(&DataDomain::Reports));
        assert_eq!(DataDomain::stored().len(), DataDomain::all().len() - 1);
    }

    #[test]
    fn test_watched_domains() {
        assert_eq!(
            DataDomain::watched(),
            &[DataDomain::Orders, DataDomain::Notifications, DataDomain::Inventory]
        );
    }

    #[test]
    fn test_domain_parse() {
        assert_eq!("Financial".parse::<DataDomain>().unwrap(), DataDomain::Financial);
        assert!("payroll".parse::<DataDomain>().is_err());
    }
}
