//! Secret storage paths and provider lookup expressions

use crate::config::{SecretPathTemplate, SecretProviderKind};

/// Produces the lookup expression a deployment evaluates to materialize a secret
pub trait SecretProvider: Send + Sync {
    /// Expression reading (or generating, with at least `length` characters) the
    /// secret stored at `path`
    fn lookup_expr(&self, path: &str, length: usize) -> String;
}

/// `pass` password store, through the `community.general.passwordstore` lookup
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordStore;

impl SecretProvider for PasswordStore {
    fn lookup_expr(&self, path: &str, length: usize) -> String {
        format!(
            "{{{{ lookup('community.general.passwordstore', '{} create=true length={}') }}}}",
            path, length
        )
    }
}

impl SecretProviderKind {
    pub fn provider(&self) -> Box<dyn SecretProvider> {
        match self {
            SecretProviderKind::Passwordstore => Box::new(PasswordStore),
        }
    }
}

/// Storage path plus lookup expression of one secret variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    pub path: String,
    pub expr: String,
}

/// Renders secret paths for a role and wraps them in provider expressions
pub struct SecretTemplater {
    role_name: String,
    template: SecretPathTemplate,
    min_length: usize,
    provider: Box<dyn SecretProvider>,
}

impl SecretTemplater {
    pub fn new(
        role_name: impl Into<String>,
        template: SecretPathTemplate,
        min_length: usize,
        provider: Box<dyn SecretProvider>,
    ) -> Self {
        Self {
            role_name: role_name.into(),
            template,
            min_length,
            provider,
        }
    }

    pub fn secret_path(&self, service_name: &str, env_key: &str) -> String {
        self.template.render(&self.role_name, service_name, env_key)
    }

    /// Requested length is the longer of the observed literal and the floor
    pub fn secret_expr(&self, path: &str, value: &str) -> String {
        let length = value.chars().count().max(self.min_length);
        self.provider.lookup_expr(path, length)
    }

    pub fn secret_ref(&self, service_name: &str, env_key: &str, value: &str) -> SecretRef {
        let path = self.secret_path(service_name, env_key);
        let expr = self.secret_expr(&path, value);
        SecretRef { path, expr }
    }
}
