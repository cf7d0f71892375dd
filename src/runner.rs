//! C5: the executor. A single long-lived worker blocking on the job
//! semaphore, invoking the named guest export, and formatting the
//! asynchronous `RESULT` line exactly as §4.5 describes.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::agent::Agent;
use crate::protocol;
use crate::sandbox::{CallOutcome, SandboxEngine};

pub fn runner_loop<E: SandboxEngine>(agent: Arc<Agent<E>>) {
    loop {
        // Step 1: block on the job semaphore.
        agent.job_sem.take();

        // Step 2: the slot may have become empty between dispatch and
        // now (e.g. a `LOAD` raced in and tore it down, §9 open
        // question, preserved). Clear flags and loop.
        let loaded = {
            let meta = agent.module_meta.lock().unwrap_or_else(|e| e.into_inner());
            meta.loaded
        };
        if !loaded {
            clear_flags(&agent);
            continue;
        }

        // Step 3: snapshot the shared request.
        let Some(req) = agent.run_request.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            clear_flags(&agent);
            continue;
        };
        let func_name = req.func_name.as_str();

        let mut slot = agent.module_slot.lock().unwrap_or_else(|e| e.into_inner());
        let Some(loaded_module) = slot.get_mut() else {
            drop(slot);
            clear_flags(&agent);
            continue;
        };

        // Step 4: look up the guest function.
        if !agent.engine.has_export(&loaded_module.instance, func_name) {
            drop(slot);
            agent.write_line(&protocol::result_no_func(func_name));
            clear_flags(&agent);
            continue;
        }

        // Steps 5-8: invoke. Result arity is determined by the engine;
        // argv doubles as the return slot per the spec's shared-width
        // convention.
        let argv = &req.argv[..req.argc];
        let outcome = agent.engine.call(&mut loaded_module.instance, func_name, argv);
        drop(slot);

        match outcome {
            Err(err) => {
                // A failure to invoke at all (as opposed to a guest
                // trap) is the execution-environment failure path. The
                // `has_export` check above already excludes `wasmi`'s
                // only `Err` variant, so this arm is presently
                // unreachable under `WasmiEngine`; kept for engines
                // that can fail to set up a call after export lookup
                // succeeds.
                agent.write_line(&protocol::result_no_exec_env(func_name, &err.to_string()));
            }
            Ok(CallOutcome::Trapped(msg)) => {
                agent.write_line(&protocol::result_exception(func_name, msg.as_deref()));
            }
            Ok(CallOutcome::Returned { ret_i32 }) => {
                if agent.stop_requested.load(Ordering::SeqCst) {
                    agent.write_line(&protocol::result_stopped(func_name));
                } else {
                    agent.write_line(&protocol::result_ok(func_name, ret_i32));
                }
            }
        }

        // Step 9: clear busy and stop_requested.
        clear_flags(&agent);
    }
}

fn clear_flags<E: SandboxEngine>(agent: &Agent<E>) {
    agent.busy.store(false, Ordering::SeqCst);
    agent.stop_requested.store(false, Ordering::SeqCst);
}
