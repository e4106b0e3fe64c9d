//! Person graph.
//!
//! An in-process property graph of `Person` vertices joined by undirected
//! `friend` and `enemy` edges. Writes are staged in a [`Transaction`] and
//! committed atomically under the graph's write lock; the name index is
//! unique, so a commit that would duplicate a name is rejected whole.
//!
//! Every endpoint answers `text/plain`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use http::{Method, StatusCode};
use parking_lot::RwLock;
use tessera_core::{QueryParams, RequestContext, ServiceError};
use tessera_server::{HandlerError, HandlerRegistry, Reply, Router};
use thiserror::Error;

/// Lowest age matched by `betweenAges` when `min` is omitted.
pub const DEFAULT_MIN_AGE: i64 = 0;
/// Highest age matched by `betweenAges` when `max` is omitted.
pub const DEFAULT_MAX_AGE: i64 = 120;

/// A vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    /// Unique name.
    pub name: String,
    /// Age in years.
    pub age: i64,
}

/// Edge label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    /// `friend`
    Friend,
    /// `enemy`
    Enemy,
}

impl Relation {
    /// Label as stored on the edge.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Friend => "friend",
            Self::Enemy => "enemy",
        }
    }
}

/// Graph failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The unique name index already holds `name`.
    #[error("A person named {0} already exists.")]
    DuplicateName(String),

    /// No vertex is named `name`.
    #[error("No person named {0}.")]
    UnknownPerson(String),
}

impl GraphError {
    /// Status the HTTP layer answers with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        ServiceError::from(self.clone()).status_code()
    }
}

impl From<GraphError> for ServiceError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::DuplicateName(_) => ServiceError::conflict(err.to_string()),
            GraphError::UnknownPerson(name) => ServiceError::not_found_resource("Person", name),
        }
    }
}

#[derive(Debug, Clone)]
struct Edge {
    relation: Relation,
    a: usize,
    b: usize,
    strength: i64,
}

impl Edge {
    fn other(&self, vertex: usize) -> Option<usize> {
        if self.a == vertex {
            Some(self.b)
        } else if self.b == vertex {
            Some(self.a)
        } else {
            None
        }
    }

    fn joins(&self, x: usize, y: usize) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }
}

#[derive(Debug, Default)]
struct GraphState {
    vertices: Vec<Person>,
    name_index: HashMap<String, usize>,
    edges: Vec<Edge>,
}

impl GraphState {
    fn vertex(&self, name: &str) -> Result<usize, GraphError> {
        self.name_index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownPerson(name.to_string()))
    }

    /// Neighbors over `relation`, strongest first; ties keep edge order.
    fn neighbors(&self, vertex: usize, relation: Relation) -> Vec<(usize, i64)> {
        let mut out: Vec<(usize, i64)> = self
            .edges
            .iter()
            .filter(|e| e.relation == relation)
            .filter_map(|e| e.other(vertex).map(|v| (v, e.strength)))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out
    }

    /// Second-hop vertices reached through `first` then `second`, ordered by
    /// the strength of the second edge.
    fn second_hop(&self, vertex: usize, first: Relation, second: Relation) -> Vec<usize> {
        let mut hops: Vec<(usize, i64)> = self
            .neighbors(vertex, first)
            .into_iter()
            .flat_map(|(middle, _)| self.neighbors(middle, second))
            .collect();
        hops.sort_by(|a, b| b.1.cmp(&a.1));
        hops.into_iter().map(|(v, _)| v).collect()
    }

    fn names(&self, vertices: impl IntoIterator<Item = usize>) -> Vec<String> {
        vertices
            .into_iter()
            .map(|v| self.vertices[v].name.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Staged {
    AddPerson(Person),
    SetEdge {
        relation: Relation,
        name1: String,
        name2: String,
        strength: i64,
    },
}

/// The graph.
#[derive(Debug, Default)]
pub struct PersonGraph {
    state: RwLock<GraphState>,
}

impl PersonGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a transaction.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction {
            graph: self,
            staged: Vec::new(),
        }
    }

    /// Adds a person in its own transaction.
    pub fn add_person(&self, name: &str, age: i64) -> Result<(), GraphError> {
        let mut tx = self.transaction();
        tx.add_person(name, age);
        tx.commit()
    }

    /// Links two people in their own transaction.
    pub fn set_relation(
        &self,
        relation: Relation,
        name1: &str,
        name2: &str,
        strength: i64,
    ) -> Result<(), GraphError> {
        let mut tx = self.transaction();
        tx.set_relation(relation, name1, name2, strength);
        tx.commit()
    }

    /// Looks a person up by name.
    pub fn person(&self, name: &str) -> Option<Person> {
        let state = self.state.read();
        state
            .name_index
            .get(name)
            .map(|v| state.vertices[*v].clone())
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.state.read().vertices.len()
    }

    /// Whether the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of people aged `min..=max`, in insertion order.
    pub fn persons_between(&self, min: i64, max: i64) -> Vec<String> {
        self.state
            .read()
            .vertices
            .iter()
            .filter(|p| p.age >= min && p.age <= max)
            .map(|p| p.name.clone())
            .collect()
    }

    /// Direct friends of `name`, strongest first.
    pub fn friends(&self, name: &str) -> Result<Vec<String>, GraphError> {
        let state = self.state.read();
        let vertex = state.vertex(name)?;
        let friends = state.neighbors(vertex, Relation::Friend);
        Ok(state.names(friends.into_iter().map(|(v, _)| v)))
    }

    /// Direct friends, then friends of friends, then enemies of enemies.
    /// Each person appears once and `name` itself never appears.
    pub fn more_friends(&self, name: &str) -> Result<Vec<String>, GraphError> {
        let state = self.state.read();
        let vertex = state.vertex(name)?;

        let direct = state
            .neighbors(vertex, Relation::Friend)
            .into_iter()
            .map(|(v, _)| v);
        let friends_of_friends = state.second_hop(vertex, Relation::Friend, Relation::Friend);
        let enemies_of_enemies = state.second_hop(vertex, Relation::Enemy, Relation::Enemy);

        let mut seen = HashSet::from([vertex]);
        let ordered: Vec<usize> = direct
            .chain(friends_of_friends)
            .chain(enemies_of_enemies)
            .filter(|v| seen.insert(*v))
            .collect();
        Ok(state.names(ordered))
    }
}

/// Staged graph writes.
#[derive(Debug)]
pub struct Transaction<'g> {
    graph: &'g PersonGraph,
    staged: Vec<Staged>,
}

impl Transaction<'_> {
    /// Stages a new vertex.
    pub fn add_person(&mut self, name: &str, age: i64) -> &mut Self {
        self.staged.push(Staged::AddPerson(Person {
            name: name.to_string(),
            age,
        }));
        self
    }

    /// Stages an undirected edge. An existing edge with the same label
    /// between the same people takes the new strength.
    pub fn set_relation(
        &mut self,
        relation: Relation,
        name1: &str,
        name2: &str,
        strength: i64,
    ) -> &mut Self {
        self.staged.push(Staged::SetEdge {
            relation,
            name1: name1.to_string(),
            name2: name2.to_string(),
            strength,
        });
        self
    }

    /// Applies every staged write, or none of them.
    pub fn commit(self) -> Result<(), GraphError> {
        let mut state = self.graph.state.write();

        let mut vertices = state.vertices.len();
        let mut names: HashMap<&str, usize> = HashMap::new();
        for op in &self.staged {
            match op {
                Staged::AddPerson(person) => {
                    if state.name_index.contains_key(&person.name)
                        || names.contains_key(person.name.as_str())
                    {
                        return Err(GraphError::DuplicateName(person.name.clone()));
                    }
                    names.insert(&person.name, vertices);
                    vertices += 1;
                }
                Staged::SetEdge { name1, name2, .. } => {
                    for name in [name1, name2] {
                        if !state.name_index.contains_key(name)
                            && !names.contains_key(name.as_str())
                        {
                            return Err(GraphError::UnknownPerson(name.clone()));
                        }
                    }
                }
            }
        }

        for op in self.staged {
            match op {
                Staged::AddPerson(person) => {
                    let id = state.vertices.len();
                    state.name_index.insert(person.name.clone(), id);
                    state.vertices.push(person);
                }
                Staged::SetEdge {
                    relation,
                    name1,
                    name2,
                    strength,
                } => {
                    let a = state.vertex(&name1)?;
                    let b = state.vertex(&name2)?;
                    match state
                        .edges
                        .iter_mut()
                        .find(|e| e.relation == relation && e.joins(a, b))
                    {
                        Some(edge) => edge.strength = strength,
                        None => state.edges.push(Edge {
                            relation,
                            a,
                            b,
                            strength,
                        }),
                    }
                    tracing::debug!(relation = relation.label(), %name1, %name2, strength, "Edge set");
                }
            }
        }
        Ok(())
    }
}

fn required<'q>(query: &'q QueryParams, name: &str) -> Result<&'q str, Reply> {
    query
        .get(name)
        .ok_or_else(|| bad_request(format!("Missing parameter: {name}")))
}

fn integer(query: &QueryParams, name: &str, default: Option<i64>) -> Result<i64, Reply> {
    match (query.get(name), default) {
        (Some(raw), _) => raw
            .parse()
            .map_err(|_| bad_request(format!("Invalid integer for {name}: {raw}"))),
        (None, Some(value)) => Ok(value),
        (None, None) => Err(bad_request(format!("Missing parameter: {name}"))),
    }
}

fn bad_request(message: String) -> Reply {
    Reply::text(message).with_status(StatusCode::BAD_REQUEST)
}

fn failure(err: &GraphError) -> Reply {
    Reply::text(err.to_string()).with_status(err.status())
}

fn listing(prefix: &str, names: &[String]) -> String {
    format!("{prefix}: {}.\n", names.join(", "))
}

/// Serves a [`PersonGraph`].
#[derive(Debug, Clone)]
pub struct GraphService {
    graph: Arc<PersonGraph>,
}

impl GraphService {
    /// Serves `graph`.
    pub fn new(graph: Arc<PersonGraph>) -> Self {
        Self { graph }
    }

    /// The underlying graph.
    pub fn graph(&self) -> &Arc<PersonGraph> {
        &self.graph
    }

    fn handle(&self, operation: &str, ctx: &RequestContext) -> Result<Reply, Reply> {
        let query = ctx.query();
        let graph = &self.graph;
        match operation {
            "add" => {
                let name = required(query, "name")?;
                let age = integer(query, "age", None)?;
                graph.add_person(name, age).map_err(|e| {
                    tracing::error!(%name, age, error = %e, "Unable to add person");
                    failure(&e)
                })?;
                Ok(Reply::empty())
            }
            "get" => {
                let name = required(query, "name")?;
                let person = graph
                    .person(name)
                    .ok_or_else(|| failure(&GraphError::UnknownPerson(name.to_string())))?;
                Ok(Reply::text(format!(
                    "{} is {} year(s) old.\n",
                    person.name, person.age
                )))
            }
            "betweenAges" => {
                let min = integer(query, "min", Some(DEFAULT_MIN_AGE))?;
                let max = integer(query, "max", Some(DEFAULT_MAX_AGE))?;
                let names = graph.persons_between(min, max);
                Ok(Reply::text(if names.is_empty() {
                    format!("No one is between {min} and {max}.\n")
                } else {
                    listing(
                        &format!("The following person(s) are between {min} and {max}"),
                        &names,
                    )
                }))
            }
            "setFriend" | "setEnemy" => {
                let relation = if operation == "setFriend" {
                    Relation::Friend
                } else {
                    Relation::Enemy
                };
                let name1 = required(query, "name1")?;
                let name2 = required(query, "name2")?;
                let strength = integer(query, "strength", None)?;
                graph
                    .set_relation(relation, name1, name2, strength)
                    .map_err(|e| failure(&e))?;
                Ok(Reply::empty())
            }
            "getFriends" | "getMoreFriends" => {
                let name = required(query, "name")?;
                let (names, kind) = if operation == "getFriends" {
                    (graph.friends(name), "friends")
                } else {
                    (graph.more_friends(name), "more friends")
                };
                let names = names.map_err(|e| failure(&e))?;
                Ok(Reply::text(if names.is_empty() {
                    format!("No one is a friend of {name}.\n")
                } else {
                    listing(&format!("The following person(s) are {kind} of {name}"), &names)
                }))
            }
            other => Err(bad_request(format!("Unknown graph operation: {other}"))),
        }
    }

    /// Routes and handlers.
    pub fn routes(&self) -> (Router, HandlerRegistry) {
        const OPERATIONS: [&str; 7] = [
            "add",
            "get",
            "betweenAges",
            "setFriend",
            "setEnemy",
            "getFriends",
            "getMoreFriends",
        ];

        let mut router = Router::new();
        let mut handlers = HandlerRegistry::new();
        for operation in OPERATIONS {
            let operation_id = format!("graph.{operation}");
            router.add_route(Method::GET, format!("/{operation}"), operation_id.clone());

            let svc = self.clone();
            handlers.register_raw(operation_id, move |ctx, _body| {
                let reply = svc.handle(operation, &ctx).unwrap_or_else(|reply| reply);
                async move { Ok::<_, HandlerError>(reply) }
            });
        }
        (router, handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people(graph: &PersonGraph, names: &[(&str, i64)]) {
        for (name, age) in names {
            graph.add_person(name, *age).unwrap();
        }
    }

    #[test]
    fn test_unique_name_index() {
        let graph = PersonGraph::new();
        graph.add_person("thomas", 30).unwrap();
        assert_eq!(
            graph.add_person("thomas", 31),
            Err(GraphError::DuplicateName("thomas".to_string()))
        );
        assert_eq!(graph.person("thomas").unwrap().age, 30);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_transaction_is_atomic() {
        let graph = PersonGraph::new();
        let mut tx = graph.transaction();
        tx.add_person("amy", 12).add_person("amy", 13);
        assert!(tx.commit().is_err());
        assert!(graph.is_empty());

        let mut tx = graph.transaction();
        tx.add_person("amy", 12)
            .add_person("brian", 13)
            .set_relation(Relation::Friend, "amy", "brian", 5);
        tx.commit().unwrap();
        assert_eq!(graph.friends("brian").unwrap(), vec!["amy"]);
    }

    #[test]
    fn test_unknown_person_in_edge() {
        let graph = PersonGraph::new();
        people(&graph, &[("amy", 12)]);
        assert_eq!(
            graph.set_relation(Relation::Friend, "amy", "zed", 1),
            Err(GraphError::UnknownPerson("zed".to_string()))
        );
        assert!(matches!(graph.friends("zed"), Err(GraphError::UnknownPerson(_))));
    }

    #[test]
    fn test_error_status() {
        assert_eq!(
            GraphError::DuplicateName("amy".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        let missing = ServiceError::from(GraphError::UnknownPerson("zed".to_string()));
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert!(missing.to_string().contains("zed"));
    }

    #[test]
    fn test_between_ages_keeps_insertion_order() {
        let graph = PersonGraph::new();
        people(&graph, &[("amy", 12), ("brian", 13), ("catherine", 40), ("dave", 50)]);
        assert!(graph.persons_between(20, 30).is_empty());
        assert_eq!(graph.persons_between(40, 120), vec!["catherine", "dave"]);
        assert_eq!(graph.persons_between(50, 50), vec!["dave"]);
    }

    #[test]
    fn test_friends_by_strength() {
        let graph = PersonGraph::new();
        people(&graph, &[("amy", 12), ("brian", 13), ("catherine", 40)]);
        graph.set_relation(Relation::Friend, "amy", "brian", 5).unwrap();
        graph.set_relation(Relation::Friend, "amy", "catherine", 10).unwrap();
        assert_eq!(graph.friends("amy").unwrap(), vec!["catherine", "brian"]);

        graph.set_relation(Relation::Friend, "brian", "amy", 20).unwrap();
        assert_eq!(graph.friends("amy").unwrap(), vec!["brian", "catherine"]);
    }

    #[test]
    fn test_more_friends() {
        let graph = PersonGraph::new();
        people(&graph, &[("amy", 12), ("brian", 13), ("catherine", 40), ("dave", 14)]);
        graph.set_relation(Relation::Friend, "amy", "brian", 5).unwrap();
        graph.set_relation(Relation::Friend, "brian", "catherine", 10).unwrap();
        graph.set_relation(Relation::Friend, "brian", "dave", 20).unwrap();
        assert_eq!(
            graph.more_friends("amy").unwrap(),
            vec!["brian", "dave", "catherine"]
        );
    }

    #[test]
    fn test_enemies_of_enemies() {
        let graph = PersonGraph::new();
        people(
            &graph,
            &[("amy", 12), ("brian", 13), ("catherine", 40), ("dave", 14), ("emma", 15)],
        );
        graph.set_relation(Relation::Friend, "amy", "brian", 5).unwrap();
        graph.set_relation(Relation::Friend, "brian", "catherine", 10).unwrap();
        graph.set_relation(Relation::Enemy, "amy", "dave", 20).unwrap();
        graph.set_relation(Relation::Enemy, "dave", "emma", 1).unwrap();
        assert_eq!(
            graph.more_friends("amy").unwrap(),
            vec!["brian", "catherine", "emma"]
        );
        assert!(graph.friends("emma").unwrap().is_empty());
    }

    #[test]
    fn test_handler_text() {
        let svc = GraphService::new(Arc::new(PersonGraph::new()));
        let ctx = |query: &str| {
            RequestContext::new()
                .with_target(Method::GET, "/graph")
                .with_query(QueryParams::parse(query))
        };

        let reply = svc.handle("add", &ctx("name=thomas&age=30")).unwrap();
        assert!(reply.body.is_empty());
        let reply = svc.handle("get", &ctx("name=thomas")).unwrap();
        assert_eq!(reply.body, "thomas is 30 year(s) old.\n");

        let err = svc.handle("add", &ctx("name=thomas&age=30")).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err = svc.handle("get", &ctx("name=nobody")).unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        let err = svc.handle("add", &ctx("name=x&age=old")).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let reply = svc.handle("betweenAges", &ctx("min=10&max=20")).unwrap();
        assert_eq!(reply.body, "No one is between 10 and 20.\n");
        let reply = svc.handle("betweenAges", &ctx("")).unwrap();
        assert_eq!(
            reply.body,
            "The following person(s) are between 0 and 120: thomas.\n"
        );
        let reply = svc.handle("getFriends", &ctx("name=thomas")).unwrap();
        assert_eq!(reply.body, "No one is a friend of thomas.\n");
    }
}
