//! Roles and the permission catalogue.
//!
//! A role is a named bundle of permission codes. Every code must come from
//! the immutable [`PERMISSION_CATALOGUE`]; system roles are seeded at startup
//! and cannot be deleted.

use collectdesk_core::RoleId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::RoleError;

/// Name of the canonical administrator role.
pub const ADMIN_ROLE_NAME: &str = "Administrador";

/// Atomic capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub group_name: &'static str,
}

const fn perm(
    code: &'static str,
    name: &'static str,
    description: &'static str,
    group_name: &'static str,
) -> Permission {
    Permission {
        code,
        name,
        description,
        group_name,
    }
}

/// Every permission the application knows about.
pub const PERMISSION_CATALOGUE: &[Permission] = &[
    perm("cases.view", "Ver casos", "Listar casos e abrir a linha do tempo", "Casos"),
    perm("cases.edit", "Editar casos", "Registrar acordos, notas e status", "Casos"),
    perm("cases.assign", "Atribuir casos", "Distribuir casos entre operadores", "Casos"),
    perm("consent.view", "Ver consentimentos", "Consultar o histórico de consentimento", "Consentimento (LGPD)"),
    perm("consent.manage", "Gerenciar consentimentos", "Registrar revogações e bases legais", "Consentimento (LGPD)"),
    perm("journeys.view", "Ver jornadas", "Consultar jornadas e cadências", "Jornadas"),
    perm("journeys.manage", "Configurar jornadas", "Criar e alterar jornadas e cadências", "Jornadas"),
    perm("analytics.view", "Ver análises", "Acessar painéis e indicadores", "Análises"),
    perm("knowledge.view", "Ver base de conhecimento", "Ler documentos da base", "Base de Conhecimento"),
    perm("knowledge.manage", "Gerenciar base de conhecimento", "Publicar e arquivar documentos", "Base de Conhecimento"),
    perm("users.view", "Ver equipe", "Listar usuários e cargos", "Equipe"),
    perm("users.invite", "Convidar usuários", "Emitir convites de acesso", "Equipe"),
    perm("users.manage", "Gerenciar usuários", "Alterar cargo e status de usuários", "Equipe"),
    perm("roles.manage", "Gerenciar cargos", "Criar, editar e excluir cargos", "Equipe"),
    perm("settings.manage", "Gerenciar configurações", "Alterar configurações da operação", "Configurações"),
];

/// Looks up a catalogue entry by code.
#[must_use]
pub fn find_permission(code: &str) -> Option<&'static Permission> {
    PERMISSION_CATALOGUE.iter().find(|p| p.code == code)
}

/// Checks that every code is in the catalogue.
///
/// # Errors
///
/// Returns `RoleError::UnknownPermission` for the first unknown code.
pub fn validate_permission_codes<'a, I>(codes: I) -> Result<(), RoleError>
where
    I: IntoIterator<Item = &'a String>,
{
    for code in codes {
        if find_permission(code).is_none() {
            return Err(RoleError::UnknownPermission { code: code.clone() });
        }
    }
    Ok(())
}

/// Catalogue entries grouped by `group_name`, in catalogue order.
#[must_use]
pub fn permission_groups() -> Vec<(&'static str, Vec<Permission>)> {
    let mut groups: Vec<(&'static str, Vec<Permission>)> = Vec::new();
    for permission in PERMISSION_CATALOGUE {
        match groups.iter_mut().find(|(name, _)| *name == permission.group_name) {
            Some((_, items)) => items.push(*permission),
            None => groups.push((permission.group_name, vec![*permission])),
        }
    }
    groups
}

/// Named permission bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub is_system: bool,
    pub permissions: BTreeSet<String>,
}

impl Role {
    /// Creates a custom (non-system) role after validating its permissions.
    ///
    /// # Errors
    ///
    /// Returns `RoleError::InvalidName` or `RoleError::UnknownPermission`.
    pub fn custom(
        name: String,
        description: Option<String>,
        color: String,
        permissions: BTreeSet<String>,
    ) -> Result<Self, RoleError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(RoleError::InvalidName);
        }
        validate_permission_codes(&permissions)?;
        Ok(Self {
            id: RoleId::new(),
            name,
            description,
            color,
            is_system: false,
            permissions,
        })
    }

    /// Returns true if this is the canonical administrator role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.name == ADMIN_ROLE_NAME
    }

    /// Returns true if the role grants the code.
    #[must_use]
    pub fn grants(&self, code: &str) -> bool {
        self.permissions.contains(code)
    }
}

fn system_role(name: &str, description: &str, color: &str, codes: &[&str]) -> Role {
    Role {
        id: RoleId::new(),
        name: name.to_string(),
        description: Some(description.to_string()),
        color: color.to_string(),
        is_system: true,
        permissions: codes.iter().map(|c| (*c).to_string()).collect(),
    }
}

/// The roles every installation starts with.
#[must_use]
pub fn system_roles() -> Vec<Role> {
    let all: Vec<&str> = PERMISSION_CATALOGUE.iter().map(|p| p.code).collect();
    vec![
        system_role(
            ADMIN_ROLE_NAME,
            "Acesso total à operação",
            "#7c3aed",
            &all,
        ),
        system_role(
            "Supervisor",
            "Coordena a carteira e a equipe de operadores",
            "#2563eb",
            &[
                "cases.view",
                "cases.edit",
                "cases.assign",
                "consent.view",
                "consent.manage",
                "journeys.view",
                "journeys.manage",
                "analytics.view",
                "knowledge.view",
                "knowledge.manage",
                "users.view",
                "users.invite",
            ],
        ),
        system_role(
            "Operador",
            "Atende e negocia os casos atribuídos",
            "#16a34a",
            &[
                "cases.view",
                "cases.edit",
                "consent.view",
                "journeys.view",
                "knowledge.view",
            ],
        ),
        system_role(
            "Visualizador",
            "Somente leitura de casos e indicadores",
            "#64748b",
            &["cases.view", "analytics.view", "knowledge.view"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_codes_are_unique() {
        let codes: BTreeSet<&str> = PERMISSION_CATALOGUE.iter().map(|p| p.code).collect();
        assert_eq!(codes.len(), PERMISSION_CATALOGUE.len());
    }

    #[test]
    fn system_role_permissions_are_in_catalogue() {
        for role in system_roles() {
            assert!(role.is_system);
            assert!(
                validate_permission_codes(&role.permissions).is_ok(),
                "{} has unknown codes",
                role.name
            );
        }
    }

    #[test]
    fn administrator_role_holds_everything() {
        let roles = system_roles();
        let admin = roles.iter().find(|r| r.is_admin()).expect("admin role");
        assert_eq!(admin.permissions.len(), PERMISSION_CATALOGUE.len());
    }

    #[test]
    fn custom_role_rejects_unknown_permission() {
        let err = Role::custom(
            "Jurídico".to_string(),
            None,
            "#000000".to_string(),
            ["cases.view".to_string(), "cases.delete".to_string()].into(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            RoleError::UnknownPermission {
                code: "cases.delete".to_string()
            }
        );
    }

    #[test]
    fn custom_role_rejects_blank_name() {
        let err = Role::custom("  ".to_string(), None, "#000".to_string(), BTreeSet::new())
            .unwrap_err();
        assert_eq!(err, RoleError::InvalidName);
    }

    #[test]
    fn custom_role_is_not_system() {
        let role = Role::custom(
            "Jurídico".to_string(),
            Some("Acompanha ações judiciais".to_string()),
            "#b91c1c".to_string(),
            ["cases.view".to_string()].into(),
        )
        .expect("valid role");
        assert!(!role.is_system);
        assert!(role.grants("cases.view"));
        assert!(!role.grants("cases.edit"));
    }

    #[test]
    fn groups_keep_catalogue_order() {
        let groups = permission_groups();
        assert_eq!(groups[0].0, "Casos");
        assert_eq!(groups[0].1.len(), 3);
        let total: usize = groups.iter().map(|(_, items)| items.len()).sum();
        assert_eq!(total, PERMISSION_CATALOGUE.len());
    }
}
