// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Lifecycle of one enclosure command: build, submit, validate, apply.

use std::pin::Pin;

use anyhow::{Context, Result};
use tracing::debug;

use crate::{
    engine::{
        builder::BuiltCommand,
        enclosure::EnclosureEngine,
        model::DeviceModel,
        request::{CommandResult, RequestFrame},
        transport::{ScsiCompletion, Transport},
        validator::Verdict,
    },
    models::status::EnclosureStatus,
    state_machine::common::{StateMachine, StateMachineCtx, Transition},
};

pub struct CommandCtx<'e, T, M> {
    engine: &'e EnclosureEngine<T, M>,
    pub frame: RequestFrame,
    pub built: Option<BuiltCommand>,
    pub completion: Option<ScsiCompletion>,
    pub verdict: Option<Verdict>,
    pub result: CommandResult,
    state: Option<CommandStates>,
}

impl<'e, T: Transport, M: DeviceModel> CommandCtx<'e, T, M> {
    pub fn new(engine: &'e EnclosureEngine<T, M>, frame: RequestFrame) -> Self {
        let result = CommandResult::new(
            EnclosureStatus::Ok,
            frame.request.operation(),
            frame.correlation,
        );
        Self {
            engine,
            frame,
            built: None,
            completion: None,
            verdict: None,
            result,
            state: Some(CommandStates::Build(Build)),
        }
    }

    /// Give the frame back once the command is finished with it.
    pub fn into_frame(self) -> RequestFrame {
        self.frame
    }

    async fn fail(&mut self, status: EnclosureStatus) {
        self.result.status = status;
        self.engine.on_failure(&self.frame, status).await;
    }

    async fn build(&mut self) -> bool {
        match self.engine.build_command(&self.frame).await {
            Ok(built) => {
                self.built = Some(built);
                true
            },
            Err(e) => {
                debug!(op = %self.result.operation, "build failed: {e}");
                self.fail((&e).into()).await;
                false
            },
        }
    }

    async fn submit(&mut self) -> Result<bool> {
        let built = self.built.as_mut().context("no built command to submit")?;
        match self.engine.submit(self.frame.correlation, built).await {
            Ok(c) => {
                self.completion = Some(c);
                Ok(true)
            },
            Err(status) => {
                self.fail(status).await;
                Ok(false)
            },
        }
    }

    async fn validate(&mut self) -> Result<bool> {
        let built = self.built.as_ref().context("no built command")?;
        let completion = self.completion.as_ref().context("no completion")?;
        let verdict = self.engine.check(&self.frame, built, completion);
        self.verdict = Some(verdict);
        self.result.sense = verdict.sense;

        let status = self
            .engine
            .apply_effect(self.result.operation, verdict.effect)
            .unwrap_or(verdict.status);
        if verdict.is_ok() && status.is_ok() {
            return Ok(true);
        }
        self.fail(status).await;
        Ok(false)
    }

    async fn apply(&mut self) -> Result<()> {
        let built = self.built.as_ref().context("no built command")?;
        let completion = self.completion.as_ref().context("no completion")?;
        let len = (completion.transferred as usize).min(completion.data_in.len());
        let data = completion.data_in.slice(..len);
        self.engine
            .apply(&self.frame, built, data, &mut self.result)
            .await;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Build;
#[derive(Debug)]
pub struct Submit;
#[derive(Debug)]
pub struct Validate;
#[derive(Debug)]
pub struct Apply;

#[derive(Debug)]
pub enum CommandStates {
    Build(Build),
    Submit(Submit),
    Validate(Validate),
    Apply(Apply),
}

type CommandStepOut = Transition<CommandStates, Result<()>>;

impl<'e, T: Transport, M: DeviceModel> StateMachine<CommandCtx<'e, T, M>, CommandStepOut>
    for Build
{
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = CommandStepOut> + Send + 'a>>
    where
        Self: 'a,
        CommandCtx<'e, T, M>: 'a;

    fn step<'a>(&'a self, ctx: &'a mut CommandCtx<'e, T, M>) -> Self::StepResult<'a> {
        Box::pin(async move {
            if ctx.build().await {
                Transition::Next(CommandStates::Submit(Submit), Ok(()))
            } else {
                Transition::Done(Ok(()))
            }
        })
    }
}

impl<'e, T: Transport, M: DeviceModel> StateMachine<CommandCtx<'e, T, M>, CommandStepOut>
    for Submit
{
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = CommandStepOut> + Send + 'a>>
    where
        Self: 'a,
        CommandCtx<'e, T, M>: 'a;

    fn step<'a>(&'a self, ctx: &'a mut CommandCtx<'e, T, M>) -> Self::StepResult<'a> {
        Box::pin(async move {
            match ctx.submit().await {
                Ok(true) => Transition::Next(CommandStates::Validate(Validate), Ok(())),
                Ok(false) => Transition::Done(Ok(())),
                Err(e) => Transition::Done(Err(e)),
            }
        })
    }
}

impl<'e, T: Transport, M: DeviceModel> StateMachine<CommandCtx<'e, T, M>, CommandStepOut>
    for Validate
{
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = CommandStepOut> + Send + 'a>>
    where
        Self: 'a,
        CommandCtx<'e, T, M>: 'a;

    fn step<'a>(&'a self, ctx: &'a mut CommandCtx<'e, T, M>) -> Self::StepResult<'a> {
        Box::pin(async move {
            match ctx.validate().await {
                Ok(true) => Transition::Next(CommandStates::Apply(Apply), Ok(())),
                Ok(false) => Transition::Done(Ok(())),
                Err(e) => Transition::Done(Err(e)),
            }
        })
    }
}

impl<'e, T: Transport, M: DeviceModel> StateMachine<CommandCtx<'e, T, M>, CommandStepOut>
    for Apply
{
    type StepResult<'a>
        = Pin<Box<dyn Future<Output = CommandStepOut> + Send + 'a>>
    where
        Self: 'a,
        CommandCtx<'e, T, M>: 'a;

    fn step<'a>(&'a self, ctx: &'a mut CommandCtx<'e, T, M>) -> Self::StepResult<'a> {
        Box::pin(async move { Transition::Done(ctx.apply().await) })
    }
}

impl<'e, T: Transport, M: DeviceModel> StateMachineCtx<CommandCtx<'e, T, M>, CommandResult>
    for CommandCtx<'e, T, M>
{
    async fn execute(&mut self) -> Result<CommandResult> {
        loop {
            let state = self.state.take().context("state must be set CommandCtx")?;
            debug!(?state, "command step");
            let tr = match state {
                CommandStates::Build(s) => s.step(self).await,
                CommandStates::Submit(s) => s.step(self).await,
                CommandStates::Validate(s) => s.step(self).await,
                CommandStates::Apply(s) => s.step(self).await,
            };

            match tr {
                Transition::Next(next, r) => {
                    r?;
                    self.state = Some(next);
                },
                Transition::Stay(Ok(())) => {},
                Transition::Stay(Err(e)) => return Err(e),
                Transition::Done(r) => {
                    r?;
                    self.result.correlation = self.frame.correlation;
                    return Ok(self.result.clone());
                },
            }
        }
    }
}
