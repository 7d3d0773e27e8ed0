use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use deskbot_okta::OktaClient;

use crate::llm::{FunctionDefinition, ToolDefinition};

/// One declared identity operation the model may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn definition(&self) -> ToolDefinition;
    async fn execute(&self, input: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> =
            self.tools.values().map(|tool| tool.definition()).collect();
        definitions.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        definitions
    }

    pub async fn execute(&self, name: &str, input: Value) -> Result<Value> {
        let Some(tool) = self.tools.get(name) else {
            bail!("unknown tool `{name}`");
        };
        tool.execute(input).await
    }
}

/// The fixed capability set handed to the agent: eight one-to-one wrappers
/// over the Okta client.
pub fn identity_tools(client: Arc<OktaClient>) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    registry.register(FindUserByEmail { client: Arc::clone(&client) });
    registry.register(GetUserGroups { client: Arc::clone(&client) });
    registry.register(ResetPassword { client: Arc::clone(&client) });
    registry.register(LockUser { client: Arc::clone(&client) });
    registry.register(UnlockUser { client: Arc::clone(&client) });
    registry.register(FindGroupByName { client: Arc::clone(&client) });
    registry.register(AddUserToGroup { client: Arc::clone(&client) });
    registry.register(ResetMfa { client });
    registry
}

fn function(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        tool_type: "function".to_string(),
        function: FunctionDefinition {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        },
    }
}

fn string_args(properties: &[(&str, &str)]) -> Value {
    let props: serde_json::Map<String, Value> = properties
        .iter()
        .map(|(key, description)| {
            ((*key).to_string(), json!({ "type": "string", "description": description }))
        })
        .collect();
    let required: Vec<&str> = properties.iter().map(|(key, _)| *key).collect();
    json!({ "type": "object", "properties": props, "required": required })
}

fn require_str<'a>(input: &'a Value, key: &str) -> Result<&'a str> {
    match input.get(key).and_then(Value::as_str) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("missing required string argument `{key}`"),
    }
}

struct FindUserByEmail {
    client: Arc<OktaClient>,
}

#[async_trait]
impl Tool for FindUserByEmail {
    fn name(&self) -> &'static str {
        "find-user-by-email"
    }

    fn definition(&self) -> ToolDefinition {
        function(
            self.name(),
            "Look up an Okta user by their exact email address. Returns the user id needed by every user-scoped operation, or found=false when no account matches.",
            string_args(&[("email", "The user's email address")]),
        )
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let email = require_str(&input, "email")?;
        match self.client.find_user_by_email(email).await? {
            Some(user) => Ok(json!({
                "found": true,
                "user_id": user.id,
                "status": user.status,
                "email": user.profile.email,
                "login": user.profile.login,
            })),
            None => Ok(json!({ "found": false })),
        }
    }
}

struct GetUserGroups {
    client: Arc<OktaClient>,
}

#[async_trait]
impl Tool for GetUserGroups {
    fn name(&self) -> &'static str {
        "get-user-groups"
    }

    fn definition(&self) -> ToolDefinition {
        function(
            self.name(),
            "List the names of all groups the user belongs to.",
            string_args(&[("user_id", "The Okta user id")]),
        )
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let user_id = require_str(&input, "user_id")?;
        let groups = self.client.get_user_groups(user_id).await?;
        Ok(json!({ "groups": groups }))
    }
}

struct ResetPassword {
    client: Arc<OktaClient>,
}

#[async_trait]
impl Tool for ResetPassword {
    fn name(&self) -> &'static str {
        "reset-password"
    }

    fn definition(&self) -> ToolDefinition {
        function(
            self.name(),
            "Generate a password reset link for the user. No email is sent; share the returned URL with the user.",
            string_args(&[("user_id", "The Okta user id")]),
        )
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let user_id = require_str(&input, "user_id")?;
        let reset_url = self.client.reset_password(user_id).await?;
        Ok(json!({ "reset_url": reset_url }))
    }
}

struct LockUser {
    client: Arc<OktaClient>,
}

#[async_trait]
impl Tool for LockUser {
    fn name(&self) -> &'static str {
        "lock-user"
    }

    fn definition(&self) -> ToolDefinition {
        function(
            self.name(),
            "Suspend the user's account so they can no longer sign in.",
            string_args(&[("user_id", "The Okta user id")]),
        )
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let user_id = require_str(&input, "user_id")?;
        self.client.lock_user(user_id).await?;
        Ok(json!({ "success": true, "message": format!("user {user_id} has been suspended") }))
    }
}

struct UnlockUser {
    client: Arc<OktaClient>,
}

#[async_trait]
impl Tool for UnlockUser {
    fn name(&self) -> &'static str {
        "unlock-user"
    }

    fn definition(&self) -> ToolDefinition {
        function(
            self.name(),
            "Unsuspend a previously suspended account.",
            string_args(&[("user_id", "The Okta user id")]),
        )
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let user_id = require_str(&input, "user_id")?;
        self.client.unlock_user(user_id).await?;
        Ok(json!({ "success": true, "message": format!("user {user_id} has been unsuspended") }))
    }
}

struct FindGroupByName {
    client: Arc<OktaClient>,
}

#[async_trait]
impl Tool for FindGroupByName {
    fn name(&self) -> &'static str {
        "find-group-by-name"
    }

    fn definition(&self) -> ToolDefinition {
        function(
            self.name(),
            "Look up a group by its exact name (case-insensitive). Returns the group id needed by add-user-to-group, or found=false.",
            string_args(&[("name", "The group name")]),
        )
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let name = require_str(&input, "name")?;
        match self.client.find_group_by_name(name).await? {
            Some(group) => Ok(json!({
                "found": true,
                "group_id": group.id,
                "name": group.profile.name,
            })),
            None => Ok(json!({ "found": false })),
        }
    }
}

struct AddUserToGroup {
    client: Arc<OktaClient>,
}

#[async_trait]
impl Tool for AddUserToGroup {
    fn name(&self) -> &'static str {
        "add-user-to-group"
    }

    fn definition(&self) -> ToolDefinition {
        function(
            self.name(),
            "Add a user to a group. Idempotent: adding an existing member succeeds.",
            string_args(&[("user_id", "The Okta user id"), ("group_id", "The Okta group id")]),
        )
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let user_id = require_str(&input, "user_id")?;
        let group_id = require_str(&input, "group_id")?;
        self.client.add_user_to_group(user_id, group_id).await?;
        Ok(json!({
            "success": true,
            "message": format!("user {user_id} added to group {group_id}"),
        }))
    }
}

struct ResetMfa {
    client: Arc<OktaClient>,
}

#[async_trait]
impl Tool for ResetMfa {
    fn name(&self) -> &'static str {
        "reset-mfa"
    }

    fn definition(&self) -> ToolDefinition {
        function(
            self.name(),
            "Reset all of the user's enrolled MFA factors so they can re-enroll.",
            string_args(&[("user_id", "The Okta user id")]),
        )
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let user_id = require_str(&input, "user_id")?;
        self.client.reset_mfa(user_id).await?;
        Ok(json!({
            "success": true,
            "message": format!("all MFA factors reset for user {user_id}"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use deskbot_okta::OktaClient;

    use super::{identity_tools, require_str, Tool, ToolRegistry};
    use crate::llm::ToolDefinition;

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn definition(&self) -> ToolDefinition {
            super::function("upper", "Uppercases the input.", super::string_args(&[("text", "x")]))
        }

        async fn execute(&self, input: Value) -> anyhow::Result<Value> {
            let text = require_str(&input, "text")?;
            Ok(json!({ "text": text.to_uppercase() }))
        }
    }

    #[tokio::test]
    async fn registry_executes_registered_tools() {
        let mut registry = ToolRegistry::default();
        registry.register(UpperTool);

        let result =
            registry.execute("upper", json!({ "text": "hello" })).await.expect("execute");
        assert_eq!(result, json!({ "text": "HELLO" }));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let registry = ToolRegistry::default();
        let error = registry.execute("nope", json!({})).await.err().expect("must fail");
        assert!(error.to_string().contains("unknown tool"));
    }

    #[test]
    fn identity_registry_declares_all_eight_operations() {
        let registry = identity_tools(Arc::new(OktaClient::new(None, None)));
        assert_eq!(registry.len(), 8);

        let names: Vec<String> =
            registry.definitions().into_iter().map(|tool| tool.function.name).collect();
        for expected in [
            "add-user-to-group",
            "find-group-by-name",
            "find-user-by-email",
            "get-user-groups",
            "lock-user",
            "reset-mfa",
            "reset-password",
            "unlock-user",
        ] {
            assert!(names.iter().any(|name| name == expected), "missing {expected}");
        }
    }

    #[test]
    fn definitions_carry_required_arguments() {
        let registry = identity_tools(Arc::new(OktaClient::new(None, None)));
        let definitions = registry.definitions();

        let add = definitions
            .iter()
            .find(|tool| tool.function.name == "add-user-to-group")
            .expect("present");
        let required = add.function.parameters["required"].as_array().expect("required array");
        assert!(required.contains(&json!("user_id")));
        assert!(required.contains(&json!("group_id")));
    }

    #[tokio::test]
    async fn missing_argument_fails_before_any_network_call() {
        let registry = identity_tools(Arc::new(OktaClient::new(None, None)));

        let error = registry
            .execute("find-user-by-email", json!({}))
            .await
            .err()
            .expect("missing email must fail");
        assert!(error.to_string().contains("email"));
    }

    #[tokio::test]
    async fn unconfigured_tenant_surfaces_as_a_tool_failure() {
        let registry = identity_tools(Arc::new(OktaClient::new(None, None)));

        let error = registry
            .execute("lock-user", json!({ "user_id": "00u1" }))
            .await
            .err()
            .expect("must fail");
        assert!(error.to_string().contains("not configured"));
    }
}
