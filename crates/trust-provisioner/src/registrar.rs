//! Trust Registrar.
//!
//! Provisions the gateway's routing objects and registers the identity
//! provider's public key as a verification credential.
//!
//! The admin API has no update-in-place for these objects that works across
//! gateway versions, so every run tears down what a previous run created and
//! recreates it:
//!
//! 1. delete credential, routes, service, consumer (404 is fine)
//! 2. create service, then each route
//! 3. create consumer
//! 4. create credential
//!
//! Dependents are always deleted before what they depend on and created
//! after it. A failed step aborts the run with no rollback; running again is
//! the recovery path.

use crate::errors::{ProvisionError, ProvisionStep};
use crate::gateway::{AdminPath, DeleteOutcome, GatewayAdmin};
use crate::models::{RouteDescriptor, ServiceDescriptor, TrustBinding};
use serde_json::json;
use tracing::instrument;

/// Drives the registration protocol against a [`GatewayAdmin`].
pub struct TrustRegistrar<'a, G: GatewayAdmin + ?Sized> {
    admin: &'a G,
    service: &'a ServiceDescriptor,
    consumer_name: &'a str,
}

impl<'a, G: GatewayAdmin + ?Sized> TrustRegistrar<'a, G> {
    pub fn new(admin: &'a G, service: &'a ServiceDescriptor, consumer_name: &'a str) -> Self {
        Self {
            admin,
            service,
            consumer_name,
        }
    }

    /// Run the full delete-then-create protocol.
    ///
    /// # Errors
    ///
    /// `ProvisionError::AdminApi` / `AdminTransport` naming the first step
    /// that failed. Later steps are not attempted.
    #[instrument(
        skip_all,
        name = "provisioner.registrar.provision",
        fields(service = %self.service.name, consumer = %self.consumer_name, routes = routes.len())
    )]
    pub async fn provision(
        &self,
        binding: &TrustBinding,
        routes: &[RouteDescriptor],
    ) -> Result<(), ProvisionError> {
        self.remove_previous(&binding.owner_identity, routes).await?;
        self.create_routing(routes).await?;
        self.create_consumer().await?;
        self.create_credential(binding).await?;

        tracing::info!(
            target: "provisioner.registrar",
            service = %self.service.name,
            consumer = %self.consumer_name,
            owner_identity = %binding.owner_identity,
            route_count = routes.len(),
            "Trust registration complete"
        );

        Ok(())
    }

    async fn remove_previous(
        &self,
        owner_identity: &str,
        routes: &[RouteDescriptor],
    ) -> Result<(), ProvisionError> {
        self.delete(
            ProvisionStep::DeleteCredential {
                consumer: self.consumer_name.to_string(),
                key: owner_identity.to_string(),
            },
            AdminPath::consumer_jwt_credential(self.consumer_name, owner_identity),
        )
        .await?;

        for route in routes {
            self.delete(
                ProvisionStep::DeleteRoute(route.name.clone()),
                AdminPath::route(&route.name),
            )
            .await?;
        }

        self.delete(
            ProvisionStep::DeleteService(self.service.name.clone()),
            AdminPath::service(&self.service.name),
        )
        .await?;

        self.delete(
            ProvisionStep::DeleteConsumer(self.consumer_name.to_string()),
            AdminPath::consumer(self.consumer_name),
        )
        .await
    }

    async fn create_routing(&self, routes: &[RouteDescriptor]) -> Result<(), ProvisionError> {
        self.create(
            ProvisionStep::CreateService(self.service.name.clone()),
            AdminPath::services(),
            json!({
                "name": self.service.name,
                "url": self.service.upstream_url,
            }),
        )
        .await?;

        for route in routes {
            self.create(
                ProvisionStep::CreateRoute(route.name.clone()),
                AdminPath::service_routes(&self.service.name),
                json!({
                    "name": route.name,
                    "paths": [route.path_prefix],
                    "strip_path": false,
                }),
            )
            .await?;
        }

        Ok(())
    }

    async fn create_consumer(&self) -> Result<(), ProvisionError> {
        self.create(
            ProvisionStep::CreateConsumer(self.consumer_name.to_string()),
            AdminPath::consumers(),
            json!({ "username": self.consumer_name }),
        )
        .await
    }

    async fn create_credential(&self, binding: &TrustBinding) -> Result<(), ProvisionError> {
        self.create(
            ProvisionStep::CreateCredential {
                consumer: self.consumer_name.to_string(),
                key: binding.owner_identity.clone(),
            },
            AdminPath::consumer_jwt(self.consumer_name),
            json!({
                "key": binding.owner_identity,
                "algorithm": binding.algorithm.as_str(),
                "rsa_public_key": binding.key.as_pem(),
            }),
        )
        .await
    }

    async fn delete(&self, step: ProvisionStep, path: AdminPath) -> Result<(), ProvisionError> {
        match self.admin.delete(&path).await {
            Ok(DeleteOutcome::Deleted) => {
                tracing::debug!(target: "provisioner.registrar", step = %step, "Removed previous object");
                Ok(())
            }
            Ok(DeleteOutcome::NotFound) => Ok(()),
            Err(e) => {
                tracing::error!(target: "provisioner.registrar", step = %step, error = %e, "Admin API call failed");
                Err(ProvisionError::admin(step, e))
            }
        }
    }

    async fn create(
        &self,
        step: ProvisionStep,
        path: AdminPath,
        body: serde_json::Value,
    ) -> Result<(), ProvisionError> {
        match self.admin.create(&path, &body).await {
            Ok(_) => {
                tracing::debug!(target: "provisioner.registrar", step = %step, "Created");
                Ok(())
            }
            Err(e) => {
                tracing::error!(target: "provisioner.registrar", step = %step, error = %e, "Admin API call failed");
                Err(ProvisionError::admin(step, e))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::gateway::mock::{AdminCall, RecordingGatewayAdmin};
    use crate::gateway::AdminCallError;
    use crate::key_material::rsa_public_key_pem;
    use crate::models::{default_routes, SigningAlgorithm};

    const ISSUER: &str = "http://localhost:8080/realms/demo-realm";

    fn service() -> ServiceDescriptor {
        ServiceDescriptor {
            name: "backend-service".to_string(),
            upstream_url: "http://backend:3000".to_string(),
        }
    }

    fn binding() -> TrustBinding {
        let mut modulus = vec![0xA5u8; 256];
        if let Some(last) = modulus.last_mut() {
            *last = 0x01;
        }
        TrustBinding {
            owner_identity: ISSUER.to_string(),
            key: rsa_public_key_pem(&modulus, &[0x01, 0x00, 0x01]).unwrap(),
            algorithm: SigningAlgorithm::Rs256,
        }
    }

    #[tokio::test]
    async fn test_protocol_order() {
        let admin = RecordingGatewayAdmin::new();
        let service = service();
        let registrar = TrustRegistrar::new(&admin, &service, "identity-provider");

        registrar.provision(&binding(), &default_routes()).await.unwrap();

        assert_eq!(
            admin.described_calls(),
            vec![
                "DELETE /consumers/identity-provider/jwt/http://localhost:8080/realms/demo-realm",
                "DELETE /routes/public-route",
                "DELETE /routes/profile-route",
                "DELETE /routes/user-route",
                "DELETE /routes/admin-route",
                "DELETE /services/backend-service",
                "DELETE /consumers/identity-provider",
                "POST /services",
                "POST /services/backend-service/routes",
                "POST /services/backend-service/routes",
                "POST /services/backend-service/routes",
                "POST /services/backend-service/routes",
                "POST /consumers",
                "POST /consumers/identity-provider/jwt",
            ]
        );
    }

    #[tokio::test]
    async fn test_request_bodies() {
        let admin = RecordingGatewayAdmin::new();
        let service = service();
        let registrar = TrustRegistrar::new(&admin, &service, "identity-provider");
        let binding = binding();

        registrar
            .provision(&binding, &[RouteDescriptor::protected("admin-route", "/admin")])
            .await
            .unwrap();

        let creates: Vec<serde_json::Value> = admin
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                AdminCall::Create(_, body) => Some(body),
                _ => None,
            })
            .collect();

        assert_eq!(
            creates,
            vec![
                json!({"name": "backend-service", "url": "http://backend:3000"}),
                json!({"name": "admin-route", "paths": ["/admin"], "strip_path": false}),
                json!({"username": "identity-provider"}),
                json!({
                    "key": ISSUER,
                    "algorithm": "RS256",
                    "rsa_public_key": binding.key.as_pem(),
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_fresh_gateway_404s_are_tolerated() {
        let admin = RecordingGatewayAdmin::empty_gateway();
        let service = service();
        let registrar = TrustRegistrar::new(&admin, &service, "identity-provider");

        registrar.provision(&binding(), &default_routes()).await.unwrap();
        assert_eq!(admin.calls().len(), 14);
    }

    #[tokio::test]
    async fn test_failed_route_creation_names_step_and_stops() {
        let admin = RecordingGatewayAdmin::failing_on(
            "POST /services/backend-service/routes",
            AdminCallError::Status {
                status: 400,
                body: r#"{"message":"schema violation (paths: should start with: /)"}"#.to_string(),
            },
        );
        let service = service();
        let registrar = TrustRegistrar::new(&admin, &service, "identity-provider");

        let err = registrar
            .provision(&binding(), &default_routes())
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            ProvisionError::AdminApi { step: ProvisionStep::CreateRoute(name), status: 400, body }
                if name == "public-route" && body.contains("schema violation")
        ));

        // Nothing after the failing call.
        let calls = admin.described_calls();
        assert_eq!(calls.last().unwrap(), "POST /services/backend-service/routes");
        assert!(!calls.iter().any(|c| c == "POST /consumers"));
    }

    #[tokio::test]
    async fn test_failed_delete_is_not_tolerated() {
        let admin = RecordingGatewayAdmin::failing_on(
            "DELETE /services/backend-service",
            AdminCallError::Status {
                status: 400,
                body: "service still has routes".to_string(),
            },
        );
        let service = service();
        let registrar = TrustRegistrar::new(&admin, &service, "identity-provider");

        let err = registrar
            .provision(&binding(), &default_routes())
            .await
            .unwrap_err();

        assert_eq!(err.failed_step(), "delete service 'backend-service'");
        assert!(!admin.described_calls().iter().any(|c| c.starts_with("POST")));
    }

    #[tokio::test]
    async fn test_credential_transport_failure() {
        let admin = RecordingGatewayAdmin::failing_on(
            "POST /consumers/identity-provider/jwt",
            AdminCallError::Transport("timed out".to_string()),
        );
        let service = service();
        let registrar = TrustRegistrar::new(&admin, &service, "identity-provider");

        let err = registrar
            .provision(&binding(), &default_routes())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::AdminTransport { step: ProvisionStep::CreateCredential { .. }, .. }
        ));
    }

    #[tokio::test]
    async fn test_runs_are_identical() {
        let first = RecordingGatewayAdmin::new();
        let second = RecordingGatewayAdmin::new();
        let service = service();

        TrustRegistrar::new(&first, &service, "identity-provider")
            .provision(&binding(), &default_routes())
            .await
            .unwrap();
        TrustRegistrar::new(&second, &service, "identity-provider")
            .provision(&binding(), &default_routes())
            .await
            .unwrap();

        assert_eq!(first.calls(), second.calls());
    }
}
