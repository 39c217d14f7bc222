//! Interactive driver (§4.4, §6.4 `-I`).
//!
//! Ownership of the `Vm` moves between the command loop and a spawned
//! run thread so neither side needs a lock: the command loop holds the
//! `Vm` whenever a `run` is not in flight, and hands it to a worker
//! thread for the duration of one. A `ctrlc` handler and a blocking
//! stdin reader both feed the same event channel the command loop
//! selects on.

use super::disasm;
use crate::vm::{ExitReason, Vm, VmError};
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

enum Event {
    Line(String),
    Interrupt,
}

enum ControlMsg {
    Pause,
}

enum RunEnd {
    Exited,
    Paused,
    Faulted(VmError),
}

struct RunOutcome {
    vm: Vm,
    end: RunEnd,
    elapsed: Duration,
    instructions: u64,
}

fn spawn_stdin_reader(tx: Sender<Event>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let text = match line {
                Ok(l) => l.trim().to_string(),
                Err(_) => "quit".to_string(),
            };
            let is_quit = text == "quit";
            if tx.send(Event::Line(text)).is_err() || is_quit {
                return;
            }
        }
        let _ = tx.send(Event::Line("quit".to_string()));
    });
}

fn spawn_run(mut vm: Vm, ctrl_rx: Receiver<ControlMsg>, done_tx: Sender<RunOutcome>) {
    thread::spawn(move || {
        vm.gc();
        let start = Instant::now();
        let end = loop {
            if ctrl_rx.try_recv().is_ok() {
                vm.pause();
                break RunEnd::Paused;
            }
            if vm.breakpoints().any(|&bp| bp == vm.pc()) {
                vm.pause();
                break RunEnd::Paused;
            }
            match vm.step() {
                Ok(Some(ExitReason::Exited)) => break RunEnd::Exited,
                Ok(Some(ExitReason::Paused)) => break RunEnd::Paused,
                Ok(None) => continue,
                Err(e) => break RunEnd::Faulted(e),
            }
        };
        let elapsed = start.elapsed();
        let instructions = vm.instructions_executed();
        let _ = done_tx.send(RunOutcome { vm, end, elapsed, instructions });
    });
}

fn report_outcome(outcome: &RunOutcome) {
    match &outcome.end {
        RunEnd::Exited => {
            let seconds = outcome.elapsed.as_secs_f64().max(1e-9);
            let mips = outcome.instructions as f64 / seconds / 1_000_000.0;
            let taint_note = if outcome.vm.tainted { ", tainted by an earlier pause" } else { "" };
            println!(
                "program exited normally (runtime {:?}, {:.3} MIPS{})",
                outcome.elapsed, mips, taint_note
            );
        }
        RunEnd::Paused => println!("vm paused at pc {:06}", outcome.vm.pc()),
        RunEnd::Faulted(e) => println!("run error: {}", e),
    }
}

fn print_help() {
    println!("commands:");
    println!("  r, run                            start or resume execution");
    println!("  pause                             request a pause at the next step");
    println!("  pc                                print the program counter");
    println!("  state                             print the vm's lifecycle state");
    println!("  sym, symbols                      dump the symbol table");
    println!("  s, stack                          dump the command stack");
    println!("  cs, callstack                     dump the call stack");
    println!("  gc, garbagecollect                reclaim zero-ref symbols now");
    println!("  b, break <addr>                   toggle a breakpoint at <addr>");
    println!("  d, disassemble [start] [count]    disassemble code");
    println!("  h, help                           this text");
    println!("  q, quit                           exit");
}

fn dispatch_inspect(vm: &mut Vm, cmd: &str) {
    let mut parts = cmd.split_whitespace();
    match parts.next().unwrap_or("") {
        "pc" => println!("{:06}", vm.pc()),
        "state" => println!("{:?}", vm.state()),
        "sym" | "symbols" => {
            for sym in vm.symbols() {
                println!("{:#06x} {:<20} {}", sym.id, sym.name, sym.value);
            }
        }
        "s" | "stack" => println!("{:?}", vm.cmd_stack()),
        "cs" | "callstack" => println!("{:?}", vm.call_stack()),
        "gc" | "garbagecollect" => {
            let n = vm.gc();
            println!("reclaimed {} symbols", n);
        }
        "b" | "break" => match parts.next().and_then(|a| a.parse().ok()) {
            Some(addr) => {
                let now_set = vm.toggle_breakpoint(addr);
                println!("breakpoint at {:06} {}", addr, if now_set { "set" } else { "cleared" });
            }
            None => println!("usage: break <addr>"),
        },
        "d" | "disassemble" => {
            let start = parts.next().and_then(|a| a.parse().ok()).unwrap_or_else(|| vm.pc());
            let count = parts.next().and_then(|a| a.parse().ok()).unwrap_or(10);
            for line in disasm::disassemble_window(vm.code(), start, count) {
                println!("{}", line);
            }
        }
        other => println!("invalid command {:?}", other),
    }
}

/// Run the line-oriented REPL until `quit`, returning the `Vm` in
/// whatever state it was left in.
pub fn run_interactive(vm: Vm) -> io::Result<Vm> {
    println!("=== Toy VM interactive driver ===\n");
    println!("press h for help\n");

    let (event_tx, event_rx) = mpsc::channel();
    spawn_stdin_reader(event_tx.clone());

    let ctrlc_tx = event_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Event::Interrupt);
    }) {
        log::warn!("failed to install ctrl-c handler: {}", e);
    }

    let mut vm_slot = Some(vm);
    let mut in_flight: Option<(Sender<ControlMsg>, Receiver<RunOutcome>)> = None;

    loop {
        print!("> ");
        io::stdout().flush()?;

        let event = match event_rx.recv() {
            Ok(e) => e,
            Err(_) => break,
        };

        match event {
            Event::Interrupt => {
                println!("interrupt!");
                match &in_flight {
                    Some((ctrl_tx, _)) => {
                        let _ = ctrl_tx.send(ControlMsg::Pause);
                    }
                    None => println!("vm not running"),
                }
            }
            Event::Line(line) => {
                if let Some((_, done_rx)) = &in_flight {
                    if let Ok(outcome) = done_rx.try_recv() {
                        report_outcome(&outcome);
                        vm_slot = Some(outcome.vm);
                        in_flight = None;
                    }
                }

                match line.as_str() {
                    "" => continue,
                    "q" | "quit" => break,
                    "h" | "help" => print_help(),
                    "r" | "run" => match vm_slot.take() {
                        Some(vm) => {
                            println!("program started");
                            let (ctrl_tx, ctrl_rx) = mpsc::channel();
                            let (done_tx, done_rx) = mpsc::channel();
                            spawn_run(vm, ctrl_rx, done_tx);
                            in_flight = Some((ctrl_tx, done_rx));
                        }
                        None => println!("vm already running"),
                    },
                    "pause" => match &in_flight {
                        Some((ctrl_tx, _)) => {
                            let _ = ctrl_tx.send(ControlMsg::Pause);
                        }
                        None => println!("vm not running"),
                    },
                    other => match vm_slot.as_mut() {
                        Some(vm) => dispatch_inspect(vm, other),
                        None => println!("vm busy running, try again after it pauses"),
                    },
                }
            }
        }
    }

    if let Some((ctrl_tx, done_rx)) = in_flight {
        let _ = ctrl_tx.send(ControlMsg::Pause);
        if let Ok(outcome) = done_rx.recv() {
            vm_slot = Some(outcome.vm);
        }
    }

    Ok(vm_slot.expect("vm is always returned to the slot before run_interactive exits"))
}
