// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::bindings::Bindings;
use crate::builtins;
use crate::database::{Clause, Database};
use crate::error::{EngineError, EngineResult};
use crate::host::{Host, Reply};
use crate::resolver::{Limits, Solution};
use crate::term::Term;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug)]
enum Goal {
    /// Call `term`; a `!` inside it cuts back to `cut` choicepoints.
    Call { term: Term, cut: usize },
    CutTo(usize),
}

#[derive(Debug)]
struct Frame {
    goal: Goal,
    next: Goals,
}

type Goals = Option<Arc<Frame>>;

fn push(goal: Goal, next: Goals) -> Goals {
    Some(Arc::new(Frame { goal, next }))
}

fn call(term: Term, cut: usize, next: Goals) -> Goals {
    push(Goal::Call { term, cut }, next)
}

enum Alternative<'a> {
    Clauses {
        goal: Term,
        clauses: &'a [Arc<Clause>],
        next: usize,
    },
    Goals(Goals),
}

struct ChoicePoint<'a> {
    alternative: Alternative<'a>,
    cont: Goals,
    trail: usize,
    events: usize,
}

pub(crate) struct Machine<'a, 'h> {
    db: &'a Database,
    host: &'h mut dyn Host,
    bindings: Bindings,
    events: Vec<Term>,
    choices: Vec<ChoicePoint<'a>>,
    steps: u64,
    limits: Limits,
}

impl<'a, 'h> Machine<'a, 'h> {
    pub(crate) fn new(db: &'a Database, host: &'h mut dyn Host, limits: Limits) -> Self {
        Self {
            db,
            host,
            bindings: Bindings::new(),
            events: Vec::new(),
            choices: Vec::new(),
            steps: 0,
            limits,
        }
    }

    pub(crate) fn steps(&self) -> u64 {
        self.steps
    }

    pub(crate) async fn solve(&mut self, goal: &Term) -> EngineResult<Vec<Solution>> {
        self.bindings.reserve_for(goal);
        let limit = self.limits.max_solutions;
        self.collect(goal.clone(), goal.clone(), limit).await
    }

    /// Enumerates solutions of `goal`, resolving `template` for each, then
    /// restores bindings, events and choicepoints to their state on entry.
    fn collect<'s>(
        &'s mut self,
        goal: Term,
        template: Term,
        limit: Option<usize>,
    ) -> BoxFuture<'s, EngineResult<Vec<Solution>>> {
        Box::pin(async move {
            let base = self.choices.len();
            let trail = self.bindings.mark();
            let events = self.events.len();
            let mut found = Vec::new();
            let result = self
                .enumerate(goal, &template, limit, base, events, &mut found)
                .await;
            self.choices.truncate(base);
            self.bindings.undo_to(trail);
            self.events.truncate(events);
            result.map(|()| found)
        })
    }

    async fn enumerate(
        &mut self,
        goal: Term,
        template: &Term,
        limit: Option<usize>,
        base: usize,
        events: usize,
        found: &mut Vec<Solution>,
    ) -> EngineResult<()> {
        if limit == Some(0) {
            return Ok(());
        }
        let mut goals = call(goal, base, None);
        while self.run(goals, base).await? {
            found.push(Solution {
                goal: self.bindings.resolve(template),
                events: self.events[events..]
                    .iter()
                    .map(|event| self.bindings.resolve(event))
                    .collect(),
            });
            if limit.is_some_and(|max| found.len() >= max) {
                break;
            }
            match self.backtrack(base) {
                Some(next) => goals = next,
                None => break,
            }
        }
        Ok(())
    }

    /// Runs until the goal list empties (`true`) or every choicepoint above
    /// `base` is exhausted (`false`).
    async fn run(&mut self, mut goals: Goals, base: usize) -> EngineResult<bool> {
        loop {
            let Some(frame) = goals else {
                return Ok(true);
            };
            let next = frame.next.clone();
            let advanced = match &frame.goal {
                Goal::CutTo(height) => {
                    self.cut_to(*height);
                    Some(next)
                }
                Goal::Call { term, cut } => {
                    self.tick()?;
                    self.step(term, *cut, next).await?
                }
            };
            goals = match advanced {
                Some(goals) => goals,
                None => match self.backtrack(base) {
                    Some(goals) => goals,
                    None => return Ok(false),
                },
            };
        }
    }

    fn tick(&mut self) -> EngineResult<()> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(EngineError::StepLimit(self.limits.max_steps));
        }
        Ok(())
    }

    fn cut_to(&mut self, height: usize) {
        if self.choices.len() > height {
            self.choices.truncate(height);
        }
    }

    fn push_alternative(&mut self, goals: Goals) {
        self.choices.push(ChoicePoint {
            alternative: Alternative::Goals(goals),
            cont: None,
            trail: self.bindings.mark(),
            events: self.events.len(),
        });
    }

    fn backtrack(&mut self, base: usize) -> Option<Goals> {
        while self.choices.len() > base {
            let choice = self.choices.pop()?;
            self.bindings.undo_to(choice.trail);
            self.events.truncate(choice.events);
            match choice.alternative {
                Alternative::Goals(goals) => return Some(goals),
                Alternative::Clauses {
                    goal,
                    clauses,
                    next,
                } => {
                    if let Some(goals) = self.try_clauses(&goal, clauses, next, choice.cont) {
                        return Some(goals);
                    }
                }
            }
        }
        None
    }

    fn try_clauses(
        &mut self,
        goal: &Term,
        clauses: &'a [Arc<Clause>],
        start: usize,
        cont: Goals,
    ) -> Option<Goals> {
        let barrier = self.choices.len();
        let trail = self.bindings.mark();
        for (index, clause) in clauses.iter().enumerate().skip(start) {
            let offset = self.bindings.allocate(clause.var_count);
            let head = clause.head.offset_vars(offset);
            if !self.bindings.unify(&head, goal) {
                self.bindings.undo_to(trail);
                continue;
            }
            if index + 1 < clauses.len() {
                self.choices.push(ChoicePoint {
                    alternative: Alternative::Clauses {
                        goal: goal.clone(),
                        clauses,
                        next: index + 1,
                    },
                    cont: cont.clone(),
                    trail,
                    events: self.events.len(),
                });
            }
            if clause.body.is_functor("true", 0) {
                return Some(cont);
            }
            return Some(call(clause.body.offset_vars(offset), barrier, cont));
        }
        None
    }

    async fn step(&mut self, term: &Term, cut: usize, next: Goals) -> EngineResult<Option<Goals>> {
        let goal = self.bindings.deref(term);
        let (name, args) = match &goal {
            Term::Var(_) => {
                return Err(EngineError::Instantiation("goal is unbound".to_string()));
            }
            Term::Int(_) | Term::BigInt(_) | Term::Float(_) => {
                return Err(EngineError::type_error("callable", &goal));
            }
            Term::Atom(name) => (name.clone(), Arc::<[Term]>::from(Vec::new())),
            Term::Compound(name, args) => (name.clone(), args.clone()),
        };
        let arity = args.len();

        match (&*name, arity) {
            ("true", 0) => return Ok(Some(next)),
            ("fail" | "false", 0) => return Ok(None),
            (",", 2) => {
                return Ok(Some(call(args[0].clone(), cut, call(args[1].clone(), cut, next))));
            }
            ("!", 0) => {
                self.cut_to(cut);
                return Ok(Some(next));
            }
            (";", 2) => return Ok(Some(self.disjunction(&args[0], &args[1], cut, next))),
            ("->", 2) => {
                let height = self.choices.len();
                let then = call(args[1].clone(), cut, next);
                return Ok(Some(call(args[0].clone(), height, push(Goal::CutTo(height), then))));
            }
            ("\\+" | "not", 1) => {
                let height = self.choices.len();
                self.push_alternative(next);
                let fail = call(Term::atom("fail"), height, None);
                let guarded = push(Goal::CutTo(height), fail);
                return Ok(Some(call(args[0].clone(), height + 1, guarded)));
            }
            ("call", n) if n >= 1 => {
                let target = add_args(&self.bindings.deref(&args[0]), &args[1..])?;
                let height = self.choices.len();
                return Ok(Some(call(target, height, next)));
            }
            ("findall", 3) => {
                let found = self.collect(args[1].clone(), args[0].clone(), None).await?;
                let list = Term::list(found.into_iter().map(|solution| solution.goal));
                return Ok(self.bindings.unify(&args[2], &list).then_some(next));
            }
            ("forall", 2) => {
                let violated = Term::compound(
                    ",",
                    vec![args[0].clone(), Term::compound("\\+", vec![args[1].clone()])],
                );
                return Ok(Some(call(Term::compound("\\+", vec![violated]), cut, next)));
            }
            _ => {}
        }

        if let Some(succeeded) = builtins::call(&mut self.bindings, &name, &args)? {
            return Ok(succeeded.then_some(next));
        }

        if self.host.handles(&name, arity) {
            return self.call_host(&goal, next).await;
        }

        let clauses = self.db.clauses(&name, arity);
        if clauses.is_empty() && !self.db.is_defined(&name, arity) {
            if self.limits.strict_unknown {
                return Err(EngineError::UnknownPredicate {
                    name: name.to_string(),
                    arity,
                });
            }
            debug!(predicate = %name, arity, "Unknown predicate fails");
            return Ok(None);
        }
        Ok(self.try_clauses(&goal, clauses, 0, next))
    }

    fn disjunction(&mut self, left: &Term, right: &Term, cut: usize, next: Goals) -> Goals {
        let left = self.bindings.deref(left);
        let height = self.choices.len();
        self.push_alternative(call(right.clone(), cut, next.clone()));
        if left.is_functor("->", 2) {
            let branch = left.args();
            let then = call(branch[1].clone(), cut, next);
            return call(branch[0].clone(), height + 1, push(Goal::CutTo(height), then));
        }
        call(left, cut, next)
    }

    async fn call_host(&mut self, goal: &Term, next: Goals) -> EngineResult<Option<Goals>> {
        let resolved = self.bindings.resolve(goal);
        trace!(goal = %resolved, "Calling host predicate");
        match self.host.call(&resolved).await? {
            Reply::Fail => Ok(None),
            Reply::Succeed { bindings, events } => {
                self.bindings.reserve_for(&resolved);
                for (left, right) in &bindings {
                    self.bindings.reserve_for(right);
                    if !self.bindings.unify(left, right) {
                        return Ok(None);
                    }
                }
                self.events.extend(events);
                Ok(Some(next))
            }
        }
    }
}

fn add_args(target: &Term, extra: &[Term]) -> EngineResult<Term> {
    if extra.is_empty() {
        return Ok(target.clone());
    }
    match target {
        Term::Atom(name) => Ok(Term::compound(&**name, extra.to_vec())),
        Term::Compound(name, args) => {
            let mut all = args.to_vec();
            all.extend_from_slice(extra);
            Ok(Term::compound(&**name, all))
        }
        Term::Var(_) => Err(EngineError::Instantiation("call/N goal is unbound".to_string())),
        other => Err(EngineError::type_error("callable", other)),
    }
}
