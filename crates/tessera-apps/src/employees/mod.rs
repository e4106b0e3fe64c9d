//! Employee registry served over two schema versions.
//!
//! The current protocol is RPC over HTTP (`POST /current/{message}` with a
//! JSON body). The legacy protocol is `GET /legacy/{message}` with query
//! parameters and is bridged onto the current registry through a
//! [`RegistryClient`], which is either the in-process registry or a remote
//! one reached through the service directory.

mod client;
mod legacy;
mod registry;

use std::sync::Arc;

use http::{Method, StatusCode};
use serde::Deserialize;
use tessera_server::{HandlerError, HandlerRegistry, Reply, Router};

pub use client::{EmployeeRegistryApi, RegistryClient, RemoteRegistry};
pub use legacy::{invoke_legacy, render_legacy_employee, LEGACY_MESSAGES};
pub use registry::{Date, Employee, EmployeeRegistry, Gender};

#[derive(Debug, Deserialize)]
struct AddEmployeeRequest {
    employee: Employee,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MakeManagerRequest {
    manager_id: i64,
    employee_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManagerIdRequest {
    manager_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmployeeIdRequest {
    employee_id: i64,
}

/// The registry and its two protocol front ends.
#[derive(Debug, Clone)]
pub struct EmployeesService {
    registry: Arc<EmployeeRegistry>,
    legacy_client: RegistryClient,
}

impl EmployeesService {
    /// Serves `registry`; legacy requests go through `legacy_client`.
    pub fn new(registry: Arc<EmployeeRegistry>, legacy_client: RegistryClient) -> Self {
        Self {
            registry,
            legacy_client,
        }
    }

    /// Serves `registry` with the legacy bridge calling it in-process.
    pub fn local(registry: Arc<EmployeeRegistry>) -> Self {
        let client = RegistryClient::Local(Arc::clone(&registry));
        Self::new(registry, client)
    }

    /// The in-process registry.
    pub fn registry(&self) -> &Arc<EmployeeRegistry> {
        &self.registry
    }

    /// Routes and handlers for both protocols.
    pub fn routes(&self) -> (Router, HandlerRegistry) {
        let mut router = Router::new();
        let mut handlers = HandlerRegistry::new();

        for message in [
            "countEmployees",
            "addEmployee",
            "makeManager",
            "getEmployees",
            "getManager",
            "removeEmployee",
        ] {
            router.add_route(
                Method::POST,
                format!("/current/{message}"),
                format!("employees.current.{message}"),
            );
        }
        router.add_route(Method::GET, "/legacy/{message}", "employees.legacy");

        let registry = Arc::clone(&self.registry);
        handlers.register_no_body("employees.current.countEmployees", move |_ctx| {
            let count = registry.count_employees();
            async move { Ok::<_, HandlerError>(count) }
        });

        let registry = Arc::clone(&self.registry);
        handlers.register(
            "employees.current.addEmployee",
            move |_ctx, req: AddEmployeeRequest| {
                let id = registry.add_employee(req.employee);
                async move { Ok::<_, HandlerError>(id) }
            },
        );

        let registry = Arc::clone(&self.registry);
        handlers.register(
            "employees.current.makeManager",
            move |_ctx, req: MakeManagerRequest| {
                registry.make_manager(req.manager_id, req.employee_id);
                async move { Ok::<_, HandlerError>(()) }
            },
        );

        let registry = Arc::clone(&self.registry);
        handlers.register(
            "employees.current.getEmployees",
            move |_ctx, req: ManagerIdRequest| {
                let employees = registry.get_employees(req.manager_id);
                async move { Ok::<_, HandlerError>(employees) }
            },
        );

        let registry = Arc::clone(&self.registry);
        handlers.register(
            "employees.current.getManager",
            move |_ctx, req: EmployeeIdRequest| {
                let manager = registry.get_manager(req.employee_id);
                async move { Ok::<_, HandlerError>(manager) }
            },
        );

        let registry = Arc::clone(&self.registry);
        handlers.register(
            "employees.current.removeEmployee",
            move |_ctx, req: EmployeeIdRequest| {
                registry.remove_employee(req.employee_id);
                async move { Ok::<_, HandlerError>(()) }
            },
        );

        let client = self.legacy_client.clone();
        handlers.register_raw("employees.legacy", move |ctx, _body| {
            let client = client.clone();
            async move {
                let message = ctx.path_param("message").unwrap_or_default();
                match invoke_legacy(&client, message, ctx.query()).await {
                    Ok(text) => Ok(Reply::text(text)),
                    Err(e) => {
                        tracing::warn!(rpc = message, error = %e, "Legacy request failed");
                        Ok(Reply::text(e.to_string()).with_status(StatusCode::BAD_REQUEST))
                    }
                }
            }
        });

        (router, handlers)
    }
}
