use std::collections::BTreeMap;

use strata_domain::{Config, Coordinate, Parameter, Project};
use tracing::debug;

use crate::error::SortError;

/// Kahn's algorithm over an explicit adjacency matrix. `matrix[from][to]`
/// marks an edge `from -> to` (`from` deploys first); ties break towards the
/// lowest index, so a pre-sorted input makes the order deterministic.
///
/// On a cycle, every node that still has incoming edges is returned together
/// with the unresolved edge sources, which is exactly what the per-layer
/// error types render as the cycle witness.
fn topology_sort(matrix: &[Vec<bool>]) -> Result<Vec<usize>, Vec<UnresolvedNode>> {
    let count = matrix.len();
    let mut in_degrees = vec![0usize; count];
    for row in matrix {
        for (to, edge) in row.iter().enumerate() {
            if *edge {
                in_degrees[to] += 1;
            }
        }
    }

    let mut order = Vec::with_capacity(count);
    let mut placed = vec![false; count];

    loop {
        let Some(next) = in_degrees
            .iter()
            .enumerate()
            .position(|(index, degree)| !placed[index] && *degree == 0)
        else {
            break;
        };

        placed[next] = true;
        order.push(next);
        for (to, edge) in matrix[next].iter().enumerate() {
            if *edge && in_degrees[to] > 0 {
                in_degrees[to] -= 1;
            }
        }
    }

    if order.len() == count {
        return Ok(order);
    }

    let unresolved = (0..count)
        .filter(|index| !placed[*index])
        .map(|index| UnresolvedNode {
            index,
            incoming_from: (0..count)
                .filter(|from| !placed[*from] && matrix[*from][index])
                .collect(),
        })
        .collect();
    Err(unresolved)
}

struct UnresolvedNode {
    index: usize,
    incoming_from: Vec<usize>,
}

// ---------------------------------------------------------------------------
// Layer 1: parameters within a config
// ---------------------------------------------------------------------------

/// Order a config's parameters so that every self-reference points backwards.
/// Names are pre-sorted, which both breaks ties and keeps two runs byte-
/// identical.
pub fn sort_parameters(
    config: &Config,
) -> Result<Vec<(String, Parameter)>, Vec<SortError>> {
    let mut parameters: Vec<(String, Parameter)> = config
        .parameters
        .iter()
        .map(|(name, parameter)| (name.clone(), parameter.clone()))
        .collect();
    parameters.sort_by(|a, b| a.0.cmp(&b.0));

    let count = parameters.len();
    let mut matrix = vec![vec![false; count]; count];
    for (from, (name, _)) in parameters.iter().enumerate() {
        for (to, (_, parameter)) in parameters.iter().enumerate() {
            if from == to {
                continue;
            }
            if parameter.references_property_of(&config.coordinate, name) {
                debug!(
                    "config parameter: {} has dependency on {}",
                    parameters[to].0, name
                );
                matrix[from][to] = true;
            }
        }
    }

    match topology_sort(&matrix) {
        Ok(order) => Ok(order.into_iter().map(|index| parameters[index].clone()).collect()),
        Err(unresolved) => Err(unresolved
            .into_iter()
            .map(|node| {
                let (name, parameter) = &parameters[node.index];
                SortError::CircularParameter {
                    config: config.coordinate.clone(),
                    environment: config.environment.clone(),
                    parameter: name.clone(),
                    depends_on: parameter.references(),
                }
            })
            .collect()),
    }
}

// ---------------------------------------------------------------------------
// Layer 2: configs within a project and environment
// ---------------------------------------------------------------------------

/// Order configs so references deploy before their readers. Skipped configs
/// produce no outgoing edges; nothing waits for a config that will not
/// deploy.
pub fn sort_configs(configs: &[&Config]) -> Result<Vec<Coordinate>, Vec<SortError>> {
    let mut sorted: Vec<&Config> = configs.to_vec();
    sorted.sort_by(|a, b| a.coordinate.cmp(&b.coordinate));

    let count = sorted.len();
    let mut matrix = vec![vec![false; count]; count];
    for (from, config) in sorted.iter().enumerate() {
        if config.skip {
            continue;
        }
        for (to, depending) in sorted.iter().enumerate() {
            if from == to {
                continue;
            }
            if depending.has_dependency_on(config) {
                debug!(
                    "configuration: {} has dependency on {}",
                    depending.coordinate, config.coordinate
                );
                matrix[from][to] = true;
            }
        }
    }

    match topology_sort(&matrix) {
        Ok(order) => Ok(order
            .into_iter()
            .map(|index| sorted[index].coordinate.clone())
            .collect()),
        Err(unresolved) => Err(unresolved
            .into_iter()
            .map(|node| {
                let config = sorted[node.index];
                SortError::CircularConfig {
                    config: config.coordinate.clone(),
                    environment: config.environment.clone(),
                    depends_on: node
                        .incoming_from
                        .iter()
                        .map(|from| sorted[*from].coordinate.clone())
                        .collect(),
                }
            })
            .collect()),
    }
}

// ---------------------------------------------------------------------------
// Layer 3: projects within an environment
// ---------------------------------------------------------------------------

/// Order projects per environment along their cross-project dependencies.
pub fn sort_projects<'a>(
    projects: &'a [Project],
    environments: &[String],
) -> Result<BTreeMap<String, Vec<&'a Project>>, Vec<SortError>> {
    let mut result = BTreeMap::new();
    let mut errors = Vec::new();

    for environment in environments {
        let count = projects.len();
        let mut matrix = vec![vec![false; count]; count];
        for (from, project) in projects.iter().enumerate() {
            for (to, depending) in projects.iter().enumerate() {
                if from == to {
                    continue;
                }
                if depending.has_dependency_on(environment, project) {
                    debug!("project: {} has dependency on {}", depending.id, project.id);
                    matrix[from][to] = true;
                }
            }
        }

        match topology_sort(&matrix) {
            Ok(order) => {
                result.insert(
                    environment.clone(),
                    order.into_iter().map(|index| &projects[index]).collect(),
                );
            }
            Err(unresolved) => {
                errors.extend(unresolved.into_iter().map(|node| {
                    let project = &projects[node.index];
                    SortError::CircularProject {
                        project: project.id.clone(),
                        environment: environment.clone(),
                        depends_on: project
                            .dependencies
                            .get(environment)
                            .cloned()
                            .unwrap_or_default(),
                    }
                }));
            }
        }
    }

    if errors.is_empty() { Ok(result) } else { Err(errors) }
}

#[cfg(test)]
mod tests;
