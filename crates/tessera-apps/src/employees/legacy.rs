//! The legacy protocol bridge.
//!
//! Legacy requests arrive as `GET /legacy/{message}?param=...`, are run
//! against the current registry, and are answered with the legacy record
//! rendering. Records carry only `id`, `firstName` and `lastName`; current
//! fields are dropped and never invented.

use tessera_core::{QueryParams, ServiceError};

use super::client::{EmployeeRegistryApi, RegistryClient};
use super::registry::Employee;

/// Messages defined by the legacy protocol.
pub const LEGACY_MESSAGES: [&str; 5] = [
    "addEmployee",
    "makeManager",
    "getEmployees",
    "getManager",
    "removeEmployee",
];

/// Renders an employee in the legacy shape.
///
/// ```
/// use tessera_apps::employees::{render_legacy_employee, Employee};
///
/// let mut employee = Employee::named("Thomas", "Feng");
/// employee.id = 1;
/// assert_eq!(
///     render_legacy_employee(&employee),
///     r#"{"id": 1, "firstName": "Thomas", "lastName": "Feng"}"#
/// );
/// ```
#[must_use]
pub fn render_legacy_employee(employee: &Employee) -> String {
    format!(
        r#"{{"id": {}, "firstName": {}, "lastName": {}}}"#,
        employee.id,
        quote(&employee.first_name),
        quote(&employee.last_name)
    )
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

fn render_list(employees: &[Employee]) -> String {
    let items: Vec<String> = employees.iter().map(render_legacy_employee).collect();
    format!("[{}]", items.join(", "))
}

fn required<'a>(query: &'a QueryParams, name: &str) -> Result<&'a str, ServiceError> {
    query
        .get(name)
        .ok_or_else(|| ServiceError::validation(format!("Missing parameter: {name}")))
}

fn required_id(query: &QueryParams, name: &str) -> Result<i64, ServiceError> {
    let raw = required(query, name)?;
    raw.trim()
        .parse()
        .map_err(|_| ServiceError::validation(format!("Invalid value for {name}: {raw}")))
}

/// Runs one legacy message and renders its result as text.
///
/// Unknown messages, including `countEmployees`, which only the current
/// protocol defines, are validation errors.
pub async fn invoke_legacy(
    client: &RegistryClient,
    message: &str,
    query: &QueryParams,
) -> Result<String, ServiceError> {
    match message {
        "addEmployee" => {
            let employee = Employee::named(
                required(query, "firstName")?,
                required(query, "lastName")?,
            );
            Ok(client.add_employee(employee).await?.to_string())
        }
        "makeManager" => {
            let manager_id = required_id(query, "managerId")?;
            let employee_id = required_id(query, "employeeId")?;
            client.make_manager(manager_id, employee_id).await?;
            Ok("null".to_string())
        }
        "getEmployees" => {
            let employees = client.get_employees(required_id(query, "managerId")?).await?;
            Ok(render_list(&employees))
        }
        "getManager" => {
            let manager = client.get_manager(required_id(query, "employeeId")?).await?;
            Ok(manager.as_ref().map_or_else(|| "null".to_string(), render_legacy_employee))
        }
        "removeEmployee" => {
            client.remove_employee(required_id(query, "employeeId")?).await?;
            Ok("null".to_string())
        }
        other => Err(ServiceError::validation(format!(
            "Message not defined in the legacy protocol: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::employees::{Date, EmployeeRegistry, Gender};

    fn client() -> (Arc<EmployeeRegistry>, RegistryClient) {
        let registry = Arc::new(EmployeeRegistry::new());
        (Arc::clone(&registry), RegistryClient::Local(registry))
    }

    #[tokio::test]
    async fn test_legacy_round() {
        let (_, client) = client();
        for (first, last) in [("Thomas", "Feng"), ("Jackson", "Wang"), ("Christine", "Lee")] {
            let query: QueryParams = [("firstName", first), ("lastName", last)].into_iter().collect();
            invoke_legacy(&client, "addEmployee", &query).await.unwrap();
        }
        for employee_id in ["2", "3"] {
            let query: QueryParams =
                [("managerId", "1"), ("employeeId", employee_id)].into_iter().collect();
            assert_eq!(invoke_legacy(&client, "makeManager", &query).await.unwrap(), "null");
        }

        let query = QueryParams::parse("managerId=1");
        assert_eq!(
            invoke_legacy(&client, "getEmployees", &query).await.unwrap(),
            r#"[{"id": 2, "firstName": "Jackson", "lastName": "Wang"}, {"id": 3, "firstName": "Christine", "lastName": "Lee"}]"#
        );
        let query = QueryParams::parse("employeeId=2");
        assert_eq!(
            invoke_legacy(&client, "getManager", &query).await.unwrap(),
            r#"{"id": 1, "firstName": "Thomas", "lastName": "Feng"}"#
        );
        let query = QueryParams::parse("employeeId=1");
        assert_eq!(invoke_legacy(&client, "getManager", &query).await.unwrap(), "null");
    }

    #[tokio::test]
    async fn test_current_fields_are_dropped() {
        let (registry, client) = client();
        registry.add_employee(Employee {
            id: 0,
            first_name: "Thomas".to_string(),
            last_name: "Feng".to_string(),
            gender: Some(Gender::Male),
            date_of_birth: Some(Date { year: 2000, month: 1, day: 1 }),
        });
        registry.add_employee(Employee::named("Jackson", "Wang"));
        registry.make_manager(1, 2);

        let rendered = invoke_legacy(&client, "getManager", &QueryParams::parse("employeeId=2"))
            .await
            .unwrap();
        assert!(!rendered.contains("gender"));
        assert!(!rendered.contains("dateOfBirth"));
    }

    #[tokio::test]
    async fn test_count_is_not_legacy() {
        let (_, client) = client();
        let err = invoke_legacy(&client, "countEmployees", &QueryParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("countEmployees"));
        assert!(!LEGACY_MESSAGES.contains(&"countEmployees"));
    }

    #[tokio::test]
    async fn test_bad_parameters() {
        let (_, client) = client();
        assert!(invoke_legacy(&client, "getManager", &QueryParams::parse("employeeId=abc"))
            .await
            .is_err());
        assert!(invoke_legacy(&client, "addEmployee", &QueryParams::parse("firstName=A"))
            .await
            .is_err());
    }
}
