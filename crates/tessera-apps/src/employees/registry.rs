//! The employee registry.

use std::collections::HashMap;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Gender in the current schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Gender {
    /// `MALE`
    Male,
    /// `FEMALE`
    Female,
}

/// Calendar date in the current schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Date {
    /// Year.
    pub year: i32,
    /// Month, 1-based.
    pub month: i32,
    /// Day of month.
    pub day: i32,
}

/// An employee in the current schema.
///
/// `gender` and `dateOfBirth` are absent for employees added through the
/// legacy protocol, which does not define them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    /// Assigned by the registry; ignored on input.
    #[serde(default)]
    pub id: i64,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Gender.
    #[serde(default)]
    pub gender: Option<Gender>,
    /// Date of birth.
    #[serde(default)]
    pub date_of_birth: Option<Date>,
}

impl Employee {
    /// An employee with only the fields both schemas share.
    #[must_use]
    pub fn named(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            first_name: first_name.into(),
            last_name: last_name.into(),
            gender: None,
            date_of_birth: None,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    last_id: i64,
    employees: HashMap<i64, Employee>,
    // manager id -> subordinate ids, in assignment order
    management: IndexMap<i64, Vec<i64>>,
}

/// In-memory employees and manager assignments.
///
/// Removing an employee only detaches it from its manager. Employees that
/// reported to it keep pointing at the removed id.
#[derive(Debug, Default)]
pub struct EmployeeRegistry {
    state: RwLock<State>,
}

impl EmployeeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `employee` under the next id and returns it.
    pub fn add_employee(&self, mut employee: Employee) -> i64 {
        let mut state = self.state.write();
        state.last_id += 1;
        let id = state.last_id;
        employee.id = id;
        state.employees.insert(id, employee);
        id
    }

    /// Total number of employees.
    pub fn count_employees(&self) -> i32 {
        i32::try_from(self.state.read().employees.len()).unwrap_or(i32::MAX)
    }

    /// Assigns `employee_id` to `manager_id`, detaching any previous manager.
    pub fn make_manager(&self, manager_id: i64, employee_id: i64) {
        let mut state = self.state.write();
        detach(&mut state, employee_id);
        state
            .management
            .entry(manager_id)
            .or_default()
            .push(employee_id);
    }

    /// Employees assigned to `manager_id`, in assignment order.
    pub fn get_employees(&self, manager_id: i64) -> Vec<Employee> {
        let state = self.state.read();
        state
            .management
            .get(&manager_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.employees.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The manager `employee_id` is assigned to, if any.
    pub fn get_manager(&self, employee_id: i64) -> Option<Employee> {
        let state = self.state.read();
        state
            .management
            .iter()
            .find(|(_, ids)| ids.contains(&employee_id))
            .and_then(|(manager_id, _)| state.employees.get(manager_id).cloned())
    }

    /// Detaches `employee_id` from its manager.
    pub fn remove_employee(&self, employee_id: i64) {
        detach(&mut self.state.write(), employee_id);
    }
}

fn detach(state: &mut State, employee_id: i64) {
    state.management.retain(|_, ids| {
        ids.retain(|id| *id != employee_id);
        !ids.is_empty()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[&str]) -> EmployeeRegistry {
        let registry = EmployeeRegistry::new();
        for name in names {
            registry.add_employee(Employee::named(*name, "Feng"));
        }
        registry
    }

    #[test]
    fn test_ids_are_sequential() {
        let registry = EmployeeRegistry::new();
        assert_eq!(registry.add_employee(Employee::named("Thomas", "Feng")), 1);
        assert_eq!(registry.add_employee(Employee::named("Jackson", "Wang")), 2);
        assert_eq!(registry.add_employee(Employee::named("Christine", "Lee")), 3);
        assert_eq!(registry.count_employees(), 3);
    }

    #[test]
    fn test_manager_assignment_order() {
        let registry = registry_with(&["a", "b", "c"]);
        registry.make_manager(1, 2);
        registry.make_manager(1, 3);

        let ids: Vec<i64> = registry.get_employees(1).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(registry.get_manager(2).unwrap().id, 1);
        assert!(registry.get_manager(1).is_none());
    }

    #[test]
    fn test_reassignment_detaches_previous_manager() {
        let registry = registry_with(&["a", "b", "c", "d"]);
        registry.make_manager(1, 2);
        registry.make_manager(4, 2);

        assert!(registry.get_employees(1).is_empty());
        assert_eq!(registry.get_manager(2).unwrap().id, 4);
    }

    #[test]
    fn test_remove_does_not_cascade() {
        let registry = registry_with(&["a", "b", "c"]);
        registry.make_manager(1, 2);
        registry.make_manager(2, 3);
        registry.remove_employee(2);

        assert!(registry.get_employees(1).is_empty());
        assert_eq!(registry.get_manager(3).unwrap().id, 2);
        assert_eq!(registry.count_employees(), 3);
    }

    #[test]
    fn test_current_schema_json() {
        let registry = EmployeeRegistry::new();
        let employee: Employee = serde_json::from_str(
            r#"{"firstName":"Thomas","lastName":"Feng","gender":"MALE","dateOfBirth":{"year":2000,"month":1,"day":1}}"#,
        )
        .unwrap();
        registry.add_employee(employee);
        registry.make_manager(1, 1);

        assert_eq!(
            serde_json::to_string(&registry.get_manager(1).unwrap()).unwrap(),
            r#"{"id":1,"firstName":"Thomas","lastName":"Feng","gender":"MALE","dateOfBirth":{"year":2000,"month":1,"day":1}}"#
        );
    }
}
