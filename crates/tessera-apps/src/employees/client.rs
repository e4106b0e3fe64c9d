//! Local or remote access to the registry.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tessera_core::ServiceError;

use super::registry::{Employee, EmployeeRegistry};

/// Operations of the current employee-registry protocol.
#[async_trait]
pub trait EmployeeRegistryApi: Send + Sync {
    /// Stores an employee and returns its id.
    async fn add_employee(&self, employee: Employee) -> Result<i64, ServiceError>;
    /// Total number of employees.
    async fn count_employees(&self) -> Result<i32, ServiceError>;
    /// Assigns `employee_id` to `manager_id`.
    async fn make_manager(&self, manager_id: i64, employee_id: i64) -> Result<(), ServiceError>;
    /// Employees assigned to `manager_id`.
    async fn get_employees(&self, manager_id: i64) -> Result<Vec<Employee>, ServiceError>;
    /// The manager of `employee_id`.
    async fn get_manager(&self, employee_id: i64) -> Result<Option<Employee>, ServiceError>;
    /// Detaches `employee_id` from its manager.
    async fn remove_employee(&self, employee_id: i64) -> Result<(), ServiceError>;
}

#[async_trait]
impl EmployeeRegistryApi for EmployeeRegistry {
    async fn add_employee(&self, employee: Employee) -> Result<i64, ServiceError> {
        Ok(Self::add_employee(self, employee))
    }

    async fn count_employees(&self) -> Result<i32, ServiceError> {
        Ok(Self::count_employees(self))
    }

    async fn make_manager(&self, manager_id: i64, employee_id: i64) -> Result<(), ServiceError> {
        Self::make_manager(self, manager_id, employee_id);
        Ok(())
    }

    async fn get_employees(&self, manager_id: i64) -> Result<Vec<Employee>, ServiceError> {
        Ok(Self::get_employees(self, manager_id))
    }

    async fn get_manager(&self, employee_id: i64) -> Result<Option<Employee>, ServiceError> {
        Ok(Self::get_manager(self, employee_id))
    }

    async fn remove_employee(&self, employee_id: i64) -> Result<(), ServiceError> {
        Self::remove_employee(self, employee_id);
        Ok(())
    }
}

/// Calls the current protocol's RPC endpoints of another Tessera instance.
#[derive(Debug, Clone)]
pub struct RemoteRegistry {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteRegistry {
    /// `base_url` is the remote service's mount point, e.g.
    /// `http://host:8080` for a registry mounted at `/`.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn call<B, T>(&self, message: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/current/{message}", self.base_url);
        let external = |e: reqwest::Error| ServiceError::external(e.to_string(), Some("employees"));

        let response = self.http.post(&url).json(body).send().await.map_err(external)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::external(
                format!("{message} returned {status}: {text}"),
                Some("employees"),
            ));
        }
        response.json().await.map_err(external)
    }
}

#[async_trait]
impl EmployeeRegistryApi for RemoteRegistry {
    async fn add_employee(&self, employee: Employee) -> Result<i64, ServiceError> {
        self.call("addEmployee", &json!({ "employee": employee })).await
    }

    async fn count_employees(&self) -> Result<i32, ServiceError> {
        self.call("countEmployees", &json!({})).await
    }

    async fn make_manager(&self, manager_id: i64, employee_id: i64) -> Result<(), ServiceError> {
        self.call::<_, Option<()>>(
            "makeManager",
            &json!({ "managerId": manager_id, "employeeId": employee_id }),
        )
        .await
        .map(drop)
    }

    async fn get_employees(&self, manager_id: i64) -> Result<Vec<Employee>, ServiceError> {
        self.call("getEmployees", &json!({ "managerId": manager_id })).await
    }

    async fn get_manager(&self, employee_id: i64) -> Result<Option<Employee>, ServiceError> {
        self.call("getManager", &json!({ "employeeId": employee_id })).await
    }

    async fn remove_employee(&self, employee_id: i64) -> Result<(), ServiceError> {
        self.call::<_, Option<()>>("removeEmployee", &json!({ "employeeId": employee_id }))
            .await
            .map(drop)
    }
}

/// The registry as seen by the legacy bridge: in-process or over HTTP.
#[derive(Debug, Clone)]
pub enum RegistryClient {
    /// The registry in this process.
    Local(Arc<EmployeeRegistry>),
    /// A registry reached through the service directory.
    Remote(RemoteRegistry),
}

impl RegistryClient {
    fn api(&self) -> &dyn EmployeeRegistryApi {
        match self {
            Self::Local(registry) => registry.as_ref(),
            Self::Remote(remote) => remote,
        }
    }
}

#[async_trait]
impl EmployeeRegistryApi for RegistryClient {
    async fn add_employee(&self, employee: Employee) -> Result<i64, ServiceError> {
        self.api().add_employee(employee).await
    }

    async fn count_employees(&self) -> Result<i32, ServiceError> {
        self.api().count_employees().await
    }

    async fn make_manager(&self, manager_id: i64, employee_id: i64) -> Result<(), ServiceError> {
        self.api().make_manager(manager_id, employee_id).await
    }

    async fn get_employees(&self, manager_id: i64) -> Result<Vec<Employee>, ServiceError> {
        self.api().get_employees(manager_id).await
    }

    async fn get_manager(&self, employee_id: i64) -> Result<Option<Employee>, ServiceError> {
        self.api().get_manager(employee_id).await
    }

    async fn remove_employee(&self, employee_id: i64) -> Result<(), ServiceError> {
        self.api().remove_employee(employee_id).await
    }
}
