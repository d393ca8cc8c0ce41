#![allow(clippy::expect_used)]

use std::collections::BTreeMap;

use strata_domain::{Config, ConfigType, Coordinate, Parameter, ParameterReference, Project, Template};

use super::{sort_configs, sort_parameters, sort_projects};
use crate::error::SortError;

fn dashboard(project: &str, id: &str) -> Config {
    Config {
        coordinate: Coordinate::new(project, "dashboard", id),
        environment: "dev".to_string(),
        type_: ConfigType::ClassicApi {
            api: "dashboard".to_string(),
            single_instance: false,
        },
        template: Template::inline("{}"),
        parameters: BTreeMap::new(),
        skip: false,
        original_object_id: None,
    }
}

fn self_reference(config: &Config, property: &str) -> Parameter {
    Parameter::Reference {
        reference: ParameterReference::new(config.coordinate.clone(), property),
    }
}

fn cross_reference(target: &Config) -> Parameter {
    Parameter::Reference {
        reference: ParameterReference::new(target.coordinate.clone(), "id"),
    }
}

#[test]
fn parameters_sort_referenced_before_referencing() {
    let mut config = dashboard("infra", "overview");
    config
        .parameters
        .insert("name".to_string(), Parameter::value("Overview"));
    config
        .parameters
        .insert("title".to_string(), self_reference(&config, "name"));

    let sorted = sort_parameters(&config).expect("sort");
    let names: Vec<&str> = sorted.iter().map(|(name, _)| name.as_str()).collect();
    let name_index = names.iter().position(|n| *n == "name").expect("name");
    let title_index = names.iter().position(|n| *n == "title").expect("title");
    assert!(name_index < title_index);
}

#[test]
fn parameter_order_is_deterministic_without_edges() {
    let mut config = dashboard("infra", "overview");
    for name in ["zeta", "alpha", "mid"] {
        config
            .parameters
            .insert(name.to_string(), Parameter::value(name));
    }

    let sorted = sort_parameters(&config).expect("sort");
    let names: Vec<&str> = sorted.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}

#[test]
fn circular_parameters_report_every_cycle_member() {
    let mut config = dashboard("infra", "overview");
    config
        .parameters
        .insert("name".to_string(), self_reference(&config, "owner"));
    config
        .parameters
        .insert("owner".to_string(), self_reference(&config, "name"));

    let errors = sort_parameters(&config).expect_err("must fail");
    assert_eq!(errors.len(), 2);
    let parameters: Vec<&str> = errors
        .iter()
        .map(|error| match error {
            SortError::CircularParameter { parameter, .. } => parameter.as_str(),
            other => panic!("unexpected error: {other}"),
        })
        .collect();
    assert!(parameters.contains(&"name"));
    assert!(parameters.contains(&"owner"));
}

#[test]
fn configs_sort_along_references() {
    let tag = {
        let mut config = dashboard("infra", "tag");
        config.coordinate = Coordinate::new("infra", "auto-tag", "tag");
        config
    };
    let mut board = dashboard("infra", "overview");
    board
        .parameters
        .insert("tagId".to_string(), cross_reference(&tag));

    let configs = [&board, &tag];
    let order = sort_configs(&configs).expect("sort");
    let tag_index = order.iter().position(|c| *c == tag.coordinate).expect("tag");
    let board_index = order
        .iter()
        .position(|c| *c == board.coordinate)
        .expect("board");
    assert!(tag_index < board_index, "referenced config deploys first");
}

#[test]
fn every_edge_points_forward_in_the_output() {
    // a <- b <- c plus unrelated d; soundness over the full permutation
    let a = dashboard("infra", "a");
    let mut b = dashboard("infra", "b");
    b.parameters.insert("ref".to_string(), cross_reference(&a));
    let mut c = dashboard("infra", "c");
    c.parameters.insert("ref".to_string(), cross_reference(&b));
    let d = dashboard("infra", "d");

    let configs = [&c, &d, &b, &a];
    let order = sort_configs(&configs).expect("sort");
    assert_eq!(order.len(), 4, "no cycle means a full permutation");

    let position = |config: &Config| {
        order
            .iter()
            .position(|coordinate| *coordinate == config.coordinate)
            .expect("present")
    };
    assert!(position(&a) < position(&b));
    assert!(position(&b) < position(&c));
}

#[test]
fn skipped_configs_produce_no_edges() {
    let mut tag = dashboard("infra", "tag");
    tag.coordinate = Coordinate::new("infra", "auto-tag", "tag");
    tag.skip = true;
    let mut board = dashboard("infra", "overview");
    board
        .parameters
        .insert("tagId".to_string(), cross_reference(&tag));
    // reverse edge would close a cycle if skip did not suppress it
    let board_ref = cross_reference(&board);
    let mut tag = tag;
    tag.parameters.insert("boardId".to_string(), board_ref);

    let configs = [&board, &tag];
    assert!(sort_configs(&configs).is_ok(), "skipped config must not pin the order");
}

#[test]
fn circular_configs_carry_the_unresolved_edges() {
    let mut one = dashboard("infra", "one");
    let mut two = dashboard("infra", "two");
    let to_one = cross_reference(&one);
    let to_two = cross_reference(&two);
    one.parameters.insert("ref".to_string(), to_two);
    two.parameters.insert("ref".to_string(), to_one);

    let configs = [&one, &two];
    let errors = sort_configs(&configs).expect_err("must fail");
    assert_eq!(errors.len(), 2);
    for error in &errors {
        match error {
            SortError::CircularConfig { depends_on, .. } => {
                assert_eq!(depends_on.len(), 1, "each node names its unresolved edge");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn projects_sort_per_environment() {
    let mut app = Project::new("app");
    app.dependencies
        .insert("dev".to_string(), vec!["base".to_string()]);
    let base = Project::new("base");

    let projects = vec![app, base];
    let sorted = sort_projects(&projects, &["dev".to_string()]).expect("sort");
    let dev = sorted.get("dev").expect("dev order");
    assert_eq!(dev[0].id, "base");
    assert_eq!(dev[1].id, "app");
}

#[test]
fn project_cycles_name_their_dependencies() {
    let mut one = Project::new("one");
    one.dependencies
        .insert("dev".to_string(), vec!["two".to_string()]);
    let mut two = Project::new("two");
    two.dependencies
        .insert("dev".to_string(), vec!["one".to_string()]);

    let projects = vec![one, two];
    let errors = sort_projects(&projects, &["dev".to_string()]).expect_err("must fail");
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|error| matches!(
        error,
        SortError::CircularProject { depends_on, .. } if !depends_on.is_empty()
    )));
}

#[test]
fn project_dependencies_in_other_environments_do_not_constrain() {
    let mut app = Project::new("app");
    app.dependencies
        .insert("prod".to_string(), vec!["base".to_string()]);
    let base = Project::new("base");

    let projects = vec![app, base];
    let sorted = sort_projects(&projects, &["dev".to_string()]).expect("sort");
    assert_eq!(sorted.get("dev").expect("dev").len(), 2);
}
