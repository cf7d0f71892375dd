//! §6/§7: wire-level reply formatting. Every line this firmware ever
//! writes to the gateway is built here, so the exact formats in the
//! external-interfaces table have one home.

pub fn hello(device_id: &str, rtos: &str, runtime: &str, fw_version: &str) -> String {
    format!("HELLO device_id={device_id} rtos={rtos} runtime={runtime} fw_version={fw_version}\n")
}

pub fn load_ready(size: u32, crc_hex: &str) -> String {
    format!("LOAD_READY size={size} crc32={crc_hex}\n")
}

pub fn load_ok() -> &'static str {
    "LOAD_OK\n"
}

pub fn load_err_bad_params(msg: &str) -> String {
    format!("LOAD_ERR code=BAD_PARAMS msg=\"{msg}\"\n")
}

pub fn load_err_no_mem() -> &'static str {
    "LOAD_ERR code=NO_MEM\n"
}

pub fn load_err_timeout() -> &'static str {
    "LOAD_ERR code=TIMEOUT msg=\"binary payload not received\"\n"
}

pub fn load_err_bad_crc(expected: u32, got: u32) -> String {
    format!("LOAD_ERR code=BAD_CRC msg=\"expected={expected:08x} got={got:08x}\"\n")
}

pub fn load_err_load_fail(msg: &str) -> String {
    format!("LOAD_ERR code=LOAD_FAIL msg=\"{msg}\"\n")
}

pub fn load_err_instantiate_fail(msg: &str) -> String {
    format!("LOAD_ERR code=INSTANTIATE_FAIL msg=\"{msg}\"\n")
}

pub fn start_ok() -> &'static str {
    "START_OK\n"
}

pub fn result_no_module(msg: Option<&str>) -> String {
    match msg {
        Some(msg) => format!("RESULT status=NO_MODULE msg=\"{msg}\"\n"),
        None => "RESULT status=NO_MODULE\n".to_string(),
    }
}

pub fn result_bad_params(msg: &str) -> String {
    format!("RESULT status=BAD_PARAMS msg=\"{msg}\"\n")
}

pub fn result_busy() -> &'static str {
    "RESULT status=BUSY\n"
}

pub fn result_no_func(name: &str) -> String {
    format!("RESULT status=NO_FUNC name={name}\n")
}

pub fn result_ok(func: &str, ret_i32: Option<u32>) -> String {
    match ret_i32 {
        Some(ret) => format!("RESULT status=OK func={func} ret_i32={ret}\n"),
        None => format!("RESULT status=OK func={func}\n"),
    }
}

pub fn result_exception(func: &str, msg: Option<&str>) -> String {
    format!("RESULT status=EXCEPTION func={func} msg=\"{}\"\n", msg.unwrap_or("<none>"))
}

pub fn result_no_exec_env(func: &str, msg: &str) -> String {
    format!("RESULT status=NO_EXEC_ENV func={func} msg=\"{msg}\"\n")
}

pub fn result_stopped(func: &str) -> String {
    format!("RESULT status=STOPPED func={func}\n")
}

pub fn stop_ok_idle() -> &'static str {
    "STOP_OK status=IDLE\n"
}

pub fn stop_ok_no_job() -> &'static str {
    "STOP_OK status=NO_JOB\n"
}

pub fn stop_ok_pending() -> &'static str {
    "STOP_OK status=PENDING\n"
}

pub fn status_ok(modules: &str, runner: &str) -> String {
    format!("STATUS_OK modules=\"{modules}\" runner={runner}\n")
}

pub fn error_unknown_command() -> &'static str {
    "ERROR code=UNKNOWN_COMMAND\n"
}
