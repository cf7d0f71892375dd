//! C4: the protocol/lifecycle controller. A single cooperative consumer
//! of the line queue, dispatching `LOAD`/`START`/`STOP`/`STATUS` exactly
//! as §4.4 describes.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::agent::Agent;
use crate::crc32;
use crate::module_slot::{truncated_module_id, LoadedModule};
use crate::parser::CommandLine;
use crate::protocol;
use crate::request::{truncated_func_name, RunRequest, MAX_ARGC};
use crate::sandbox::SandboxEngine;

pub fn comm_loop<E: SandboxEngine>(agent: Arc<Agent<E>>) {
    loop {
        let line = agent.line_queue.pop_blocking();
        let Ok(text) = std::str::from_utf8(&line) else {
            agent.write_line(protocol::error_unknown_command());
            continue;
        };
        let Some(cmd) = CommandLine::parse(text) else {
            continue;
        };
        match cmd.verb {
            "LOAD" => handle_load(&agent, &cmd),
            "START" => handle_start(&agent, &cmd),
            "STOP" => handle_stop(&agent, &cmd),
            "STATUS" => handle_status(&agent),
            _ => agent.write_line(protocol::error_unknown_command()),
        }
    }
}

fn handle_load<E: SandboxEngine>(agent: &Agent<E>, cmd: &CommandLine) {
    // Step 1/2: validate presence and parse size/crc32.
    let Some(size_str) = cmd.param("size") else {
        agent.write_line(&protocol::load_err_bad_params("missing size"));
        return;
    };
    let Some(crc_str) = cmd.param("crc32") else {
        agent.write_line(&protocol::load_err_bad_params("missing crc32"));
        return;
    };
    let Ok(size) = size_str.parse::<u32>() else {
        agent.write_line(&protocol::load_err_bad_params("size must be decimal"));
        return;
    };
    if size == 0 {
        agent.write_line(&protocol::load_err_bad_params("size must be nonzero"));
        return;
    }
    let Ok(declared_crc) = u32::from_str_radix(crc_str, 16) else {
        agent.write_line(&protocol::load_err_bad_params("crc32 must be hex"));
        return;
    };

    // Step 3: tear down whatever is loaded, unconditionally, before any
    // new allocation, even if the runner is currently busy with it.
    // §9 open question: the original never checks `busy` here either;
    // preserved as specified. In this hosted port the teardown briefly
    // blocks on the slot mutex if RUNNER is mid-call, which is the
    // unavoidable safe substitute for the original's unguarded race.
    {
        let mut slot = agent.module_slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.teardown();
    }
    agent.set_module_meta(false, None);

    // Step 4: probe that the destination buffer is actually affordable
    // before telling the framer to allocate it.
    let size_usize = size as usize;
    let mut probe: Vec<u8> = Vec::new();
    if probe.try_reserve_exact(size_usize).is_err() {
        agent.write_line(protocol::load_err_no_mem());
        return;
    }
    drop(probe);

    // Step 5: switch RX framer to BINARY mode under its own critical
    // section, before LOAD_READY is written to the byte sink.
    agent.framer.start_binary_reception(size_usize);

    // Step 6: LOAD_READY, then wait for the binary payload with a timeout.
    agent.write_line(&protocol::load_ready(size, crc_str));
    let completed = agent.bin_sem.take_timeout(agent.config.binary_upload_timeout());
    if !completed {
        agent.framer.force_line_mode();
        agent.write_line(protocol::load_err_timeout());
        return;
    }
    let Some(received) = agent.framer.take_completed_binary() else {
        agent.framer.force_line_mode();
        agent.write_line(protocol::load_err_timeout());
        return;
    };

    // Step 7: integrity check.
    let actual_crc = crc32::crc32(&received);
    if actual_crc != declared_crc {
        agent.write_line(&protocol::load_err_bad_crc(declared_crc, actual_crc));
        return;
    }

    // Step 8: parse.
    let module = match agent.engine.parse(&received) {
        Ok(module) => module,
        Err(err) => {
            agent.write_line(&protocol::load_err_load_fail(&err.to_string()));
            return;
        }
    };

    // Step 9: instantiate with configured stack/heap budgets.
    let native_ctx = agent.make_native_context();
    let instance = match agent.engine.instantiate(
        &module,
        agent.config.guest_stack_bytes,
        agent.config.guest_heap_bytes,
        native_ctx,
    ) {
        Ok(instance) => instance,
        Err(err) => {
            agent.write_line(&protocol::load_err_instantiate_fail(&err.to_string()));
            return;
        }
    };

    // Step 10: mark loaded, reply LOAD_OK.
    let module_id = truncated_module_id(cmd.param("module_id").unwrap_or(""));
    {
        let mut slot = agent.module_slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.install(LoadedModule {
            buffer: received,
            module,
            instance,
            module_id: module_id.clone(),
        });
    }
    agent.set_module_meta(true, Some(module_id));
    agent.write_line(protocol::load_ok());
}

fn handle_start<E: SandboxEngine>(agent: &Agent<E>, cmd: &CommandLine) {
    let (loaded, current_id) = {
        let meta = agent.module_meta.lock().unwrap_or_else(|e| e.into_inner());
        (meta.loaded, meta.module_id.clone())
    };

    if !loaded {
        agent.write_line(&protocol::result_no_module(None));
        return;
    }
    let Some(module_id_param) = cmd.param("module_id") else {
        agent.write_line(&protocol::result_bad_params("missing module_id"));
        return;
    };
    if current_id.as_deref() != Some(module_id_param) {
        agent.write_line(&protocol::result_no_module(Some("module_id mismatch")));
        return;
    }
    if agent.busy.load(Ordering::SeqCst) {
        agent.write_line(protocol::result_busy());
        return;
    }
    let Some(func) = cmd.param("func") else {
        agent.write_line(&protocol::result_bad_params("missing func"));
        return;
    };

    let has_export = {
        let slot = agent.module_slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.get() {
            Some(loaded) => agent.engine.has_export(&loaded.instance, func),
            None => false,
        }
    };
    if !has_export {
        agent.write_line(&protocol::result_no_func(func));
        return;
    }

    let parsed_args = cmd.args();
    let mut argv = [0u32; MAX_ARGC];
    for (slot, value) in argv.iter_mut().zip(parsed_args.iter()) {
        *slot = *value as u32;
    }

    *agent.run_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(RunRequest {
        func_name: truncated_func_name(func),
        argc: parsed_args.len(),
        argv,
    });
    agent.stop_requested.store(false, Ordering::SeqCst);
    agent.busy.store(true, Ordering::SeqCst);
    agent.job_sem.give();
    agent.write_line(protocol::start_ok());
}

fn handle_stop<E: SandboxEngine>(agent: &Agent<E>, cmd: &CommandLine) {
    if !agent.busy.load(Ordering::SeqCst) {
        agent.write_line(protocol::stop_ok_idle());
        return;
    }
    let Some(module_id_param) = cmd.param("module_id") else {
        agent.write_line(protocol::stop_ok_no_job());
        return;
    };
    let current_id = {
        let meta = agent.module_meta.lock().unwrap_or_else(|e| e.into_inner());
        meta.module_id.clone()
    };
    if current_id.as_deref() != Some(module_id_param) {
        agent.write_line(protocol::stop_ok_no_job());
        return;
    }
    agent.stop_requested.store(true, Ordering::SeqCst);
    agent.write_line(protocol::stop_ok_pending());
}

fn handle_status<E: SandboxEngine>(agent: &Agent<E>) {
    let loaded = {
        let meta = agent.module_meta.lock().unwrap_or_else(|e| e.into_inner());
        meta.loaded
    };
    let modules = if loaded { "wasm_module(loaded)" } else { "none" };
    let runner = if agent.busy.load(Ordering::SeqCst) {
        "RUNNING"
    } else {
        "IDLE"
    };
    agent.write_line(&protocol::status_ok(modules, runner));
}
