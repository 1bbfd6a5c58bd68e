//! ConstraintEnforcer (§4.8.3): enforces `max_agents`, `max_tokens`, and
//! `prefer_parallel` on a candidate agent list, auto-adjusting by dropping
//! the lowest-priority agents before giving up.

use std::collections::HashMap;

use crate::types::{AgentId, AgentSpec, PlanConstraints};

#[derive(Debug, Clone)]
pub struct ConstraintFailure {
    pub reason: String,
}

/// Drops lowest-priority agents until `max_agents`/`max_tokens` hold, or
/// returns a failure describing why no adjustment is possible.
pub fn enforce(
    agents: &mut Vec<AgentSpec>,
    token_cost: &HashMap<AgentId, u64>,
    constraints: &PlanConstraints,
) -> Result<u64, ConstraintFailure> {
    if let Some(max_tokens) = constraints.max_tokens {
        let cheapest = agents
            .iter()
            .map(|a| token_cost.get(&a.agent_id).copied().unwrap_or(0))
            .min()
            .unwrap_or(0);
        if cheapest > max_tokens {
            return Err(ConstraintFailure {
                reason: format!(
                    "cheapest candidate agent costs {cheapest} tokens, above max_tokens={max_tokens}"
                ),
            });
        }
    }

    if let Some(max_agents) = constraints.max_agents {
        if max_agents == 0 {
            return Err(ConstraintFailure {
                reason: "max_agents=0 leaves no agent to execute the plan".to_string(),
            });
        }
        while agents.len() > max_agents {
            drop_lowest_priority(agents);
        }
    }

    if let Some(max_tokens) = constraints.max_tokens {
        loop {
            let total = total_tokens(agents, token_cost);
            if total <= max_tokens {
                break;
            }
            if agents.len() <= 1 {
                return Err(ConstraintFailure {
                    reason: format!("cannot fit plan within max_tokens={max_tokens} without an empty plan"),
                });
            }
            drop_lowest_priority(agents);
        }
    }

    Ok(total_tokens(agents, token_cost))
}

fn total_tokens(agents: &[AgentSpec], token_cost: &HashMap<AgentId, u64>) -> u64 {
    let sum: u64 = agents.iter().map(|a| token_cost.get(&a.agent_id).copied().unwrap_or(0)).sum();
    sum + sum / 10
}

fn drop_lowest_priority(agents: &mut Vec<AgentSpec>) {
    if let Some((idx, _)) = agents
        .iter()
        .enumerate()
        .min_by_key(|(_, a)| a.priority)
    {
        agents.remove(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;

    fn spec(id: &str, priority: Priority) -> AgentSpec {
        AgentSpec {
            agent_id: id.to_string(),
            task_description: "do work".to_string(),
            prompt: "do work".to_string(),
            dependencies: Vec::new(),
            priority,
        }
    }

    #[test]
    fn max_agents_one_leaves_highest_priority_agent() {
        let mut agents = vec![spec("a", Priority::Low), spec("b", Priority::Critical)];
        let costs = HashMap::from([("a".to_string(), 100), ("b".to_string(), 100)]);
        let constraints = PlanConstraints { max_agents: Some(1), max_tokens: None, prefer_parallel: false };

        enforce(&mut agents, &costs, &constraints).unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].agent_id, "b");
    }

    #[test]
    fn max_tokens_below_cheapest_agent_fails() {
        let mut agents = vec![spec("a", Priority::Medium)];
        let costs = HashMap::from([("a".to_string(), 1000)]);
        let constraints = PlanConstraints { max_agents: None, max_tokens: Some(10), prefer_parallel: false };

        assert!(enforce(&mut agents, &costs, &constraints).is_err());
    }

    #[test]
    fn max_tokens_drops_agents_until_it_fits() {
        let mut agents = vec![spec("a", Priority::Low), spec("b", Priority::High)];
        let costs = HashMap::from([("a".to_string(), 500), ("b".to_string(), 500)]);
        let constraints = PlanConstraints { max_agents: None, max_tokens: Some(600), prefer_parallel: false };

        enforce(&mut agents, &costs, &constraints).unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].agent_id, "b");
    }
}
