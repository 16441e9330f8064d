// ── Demo window ───────────────────────────────────────────────────────────────
//
// Responsibilities in this file (unsafe confined here):
//   • Initialise OLE and register the demo window class.
//   • Create the top-level window and embed one `Browser` in it.
//   • Run the Win32 message loop; drain posted tasks on WM_APP.
//   • Route WM_SIZE, WM_SETFOCUS, WM_PARENTNOTIFY to the browser.
//   • Expose a safe error-dialog helper for use by main().

use std::{cell::RefCell, rc::Rc};

use windows::{
    core::{w, PCWSTR},
    Win32::{
        Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, WPARAM},
        Graphics::Gdi::{GetStockObject, UpdateWindow, HBRUSH, WHITE_BRUSH},
        System::{
            LibraryLoader::GetModuleHandleW,
            Ole::{OleInitialize, OleUninitialize},
        },
        UI::WindowsAndMessaging::{
            CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW, LoadCursorW, LoadIconW,
            MessageBoxW, PostMessageW, PostQuitMessage, RegisterClassExW, SetWindowTextW, ShowWindow,
            TranslateMessage, CS_HREDRAW, CS_VREDRAW, CW_USEDEFAULT, HMENU, IDC_ARROW,
            IDI_APPLICATION, MB_ICONERROR, MB_OK, MSG, SW_SHOW, WINDOW_EX_STYLE, WM_APP, WM_CLOSE, WM_DESTROY,
            WM_PARENTNOTIFY, WM_SETFOCUS, WM_SIZE, WNDCLASSEXW, WS_CLIPCHILDREN, WS_OVERLAPPEDWINDOW,
        },
    },
};

use tracing::{debug, info, warn};

use super::{automation::ComAutomation, hwnd, last_error, wide, window_id};
use crate::{
    automation::{Rect, WindowId},
    browser::Browser,
    config::HostConfig,
    error::Result,
    task::{Task, TaskQueue, TaskRunner},
};

// ── Window identity ───────────────────────────────────────────────────────────

const CLASS_NAME: PCWSTR = w!("TridentDemoWindow");
const APP_TITLE: PCWSTR = w!("Trident");
const DEFAULT_WIDTH: i32 = 1024;
const DEFAULT_HEIGHT: i32 = 720;

/// Posted to the demo window whenever a task is queued.
const WM_RUN_TASKS: u32 = WM_APP + 1;

/// `VK_ESCAPE`.
const VK_ESCAPE: u32 = 0x1B;

/// Shown when no URL is given on the command line.
const WELCOME_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Trident</title></head>
<body style="font-family: Segoe UI, sans-serif; margin: 2em">
<h1>Trident</h1>
<p>This page was handed to the control as a string.</p>
<p>Pass a URL on the command line to open it instead. Press Esc to quit.</p>
<p><button onclick="trident.post({ clicked: new Date().toISOString() })">Say hello to the host</button></p>
</body>
</html>"#;

/// Injected into every completed document.  `trident.post` reaches the
/// host through `window.external`.
const BINDING_SCRIPT: &str = "window.trident = { host: 'trident-demo', \
post: function (m) { window.external.postMessage(JSON.stringify(m)); } };";

// ── Per-thread state ──────────────────────────────────────────────────────────

struct Demo {
    browser: Browser<ComAutomation>,
    tasks: TaskQueue,
}

thread_local! {
    static DEMO: RefCell<Option<Demo>> = const { RefCell::new(None) };
}

/// Clone the browser handle out of the thread state so no borrow is held
/// while the browser runs (it may pump messages and re-enter `wnd_proc`).
fn browser() -> Option<Browser<ComAutomation>> {
    DEMO.with(|demo| demo.borrow().as_ref().map(|d| d.browser.clone()))
}

fn tasks() -> Option<TaskQueue> {
    DEMO.with(|demo| demo.borrow().as_ref().map(|d| d.tasks.clone()))
}

/// Queues tasks and wakes the window's message loop to run them.
struct PostedTasks {
    queue: TaskQueue,
    window: WindowId,
}

impl TaskRunner for PostedTasks {
    fn post_task(&self, task: Task) {
        // One wake-up per batch: a non-empty queue already has one pending.
        let idle = self.queue.is_empty();
        self.queue.post_task(task);
        if !idle {
            return;
        }
        // SAFETY: posting to a window owned by this thread; a failure only
        // means the window is gone, in which case the task is dropped with it.
        if let Err(e) = unsafe { PostMessageW(hwnd(self.window), WM_RUN_TASKS, WPARAM(0), LPARAM(0)) } {
            debug!(error = %e, "could not wake task queue");
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Create the demo window, embed a browser showing `start_url` (or the
/// built-in welcome page), and drive the message loop until it closes.
pub fn run(config: HostConfig, start_url: Option<String>) -> Result<()> {
    // SAFETY: called once on the UI thread before any COM object is created;
    // balanced by OleUninitialize below.
    unsafe { OleInitialize(None) }?;
    let result = run_window(config, start_url);
    // SAFETY: balances the successful OleInitialize above.
    unsafe { OleUninitialize() };
    result
}

/// Show a modal error dialog with the given message.
pub fn show_error_dialog(message: &str) {
    let msg_wide = wide(message);
    let title_wide = wide("Trident: fatal error");

    // SAFETY: both buffers are valid NUL-terminated UTF-16 strings that stay
    // allocated for the duration of the call.  A null owner is allowed.
    unsafe {
        let _ = MessageBoxW(
            HWND::default(),
            PCWSTR(msg_wide.as_ptr()),
            PCWSTR(title_wide.as_ptr()),
            MB_OK | MB_ICONERROR,
        );
    }
}

fn run_window(config: HostConfig, start_url: Option<String>) -> Result<()> {
    // SAFETY: GetModuleHandleW(None) returns the .exe's own module handle.
    let hmodule = unsafe { GetModuleHandleW(None) }?;
    let hinstance = HINSTANCE(hmodule.0);

    register_class(hinstance)?;
    let window = create_window(hinstance)?;
    let browser = embed_browser(window, config);

    match start_url {
        Some(url) => browser.load_url(&url),
        None => browser.load_html(WELCOME_HTML, ""),
    }

    // SAFETY: `window` was just created and is valid.  Return values only
    // report previous visibility / repaint state.
    unsafe {
        let _ = ShowWindow(window, SW_SHOW);
        let _ = UpdateWindow(window);
    }

    message_loop()
}

fn embed_browser(window: HWND, config: HostConfig) -> Browser<ComAutomation> {
    let id = window_id(window);
    let tasks = TaskQueue::new();
    let runner = Rc::new(PostedTasks { queue: tasks.clone(), window: id });
    let browser = Browser::new(id, config, runner, super::automation::activate);

    browser.set_binding_script(BINDING_SCRIPT);
    browser.set_key_event_handler(move |key| {
        if key.is_key_down() && key.virtual_key() == VK_ESCAPE {
            // SAFETY: `id` names the demo window, owned by this thread.
            let _ = unsafe { PostMessageW(hwnd(id), WM_CLOSE, WPARAM(0), LPARAM(0)) };
            return true;
        }
        false
    });
    browser.on_finish_navigation().connect(|browser| {
        browser.execute_javascript(
            "location.href",
            Some(Box::new(|ok, url| info!(ok, %url, "navigation finished"))),
        );
    });
    browser.on_update_title().connect(move |title| {
        let title = wide(title);
        // SAFETY: `title` is NUL-terminated and outlives the call.
        if let Err(e) = unsafe { SetWindowTextW(hwnd(id), PCWSTR(title.as_ptr())) } {
            debug!(error = %e, "SetWindowTextW failed");
        }
    });
    browser.on_script_message().connect(|message| info!(%message, "message from page"));
    browser.on_close().connect(move |_| {
        info!("page closed itself; closing the demo window");
        // SAFETY: as above.
        let _ = unsafe { PostMessageW(hwnd(id), WM_CLOSE, WPARAM(0), LPARAM(0)) };
    });

    if !browser.is_active() {
        warn!("browser control unavailable; the window will stay empty");
    }
    DEMO.with(|demo| {
        *demo.borrow_mut() = Some(Demo {
            browser: browser.clone(),
            tasks,
        })
    });
    browser
}

// ── Window class registration ─────────────────────────────────────────────────

fn register_class(hinstance: HINSTANCE) -> Result<()> {
    // SAFETY: IDI_APPLICATION / IDC_ARROW are built-in resources.
    let icon = unsafe { LoadIconW(HINSTANCE::default(), IDI_APPLICATION) }?;
    let cursor = unsafe { LoadCursorW(HINSTANCE::default(), IDC_ARROW) }?;

    // SAFETY: GetStockObject(WHITE_BRUSH) always returns a valid brush.
    let bg_brush = unsafe { HBRUSH(GetStockObject(WHITE_BRUSH).0) };

    let wndclass = WNDCLASSEXW {
        cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
        style: CS_HREDRAW | CS_VREDRAW,
        lpfnWndProc: Some(wnd_proc),
        cbClsExtra: 0,
        cbWndExtra: 0,
        hInstance: hinstance,
        hIcon: icon,
        hCursor: cursor,
        hbrBackground: bg_brush,
        lpszMenuName: PCWSTR::null(),
        lpszClassName: CLASS_NAME,
        hIconSm: icon,
    };

    // SAFETY: wndclass is fully initialised with valid handles.
    let atom = unsafe { RegisterClassExW(&wndclass) };
    if atom == 0 {
        return Err(last_error("RegisterClassExW"));
    }
    Ok(())
}

// ── Window creation ───────────────────────────────────────────────────────────

fn create_window(hinstance: HINSTANCE) -> Result<HWND> {
    // SAFETY: CLASS_NAME was just registered; a null parent creates a
    // top-level window.  WS_CLIPCHILDREN keeps the control from flickering.
    let window = unsafe {
        CreateWindowExW(
            WINDOW_EX_STYLE(0),
            CLASS_NAME,
            APP_TITLE,
            WS_OVERLAPPEDWINDOW | WS_CLIPCHILDREN,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            DEFAULT_WIDTH,
            DEFAULT_HEIGHT,
            HWND::default(),
            HMENU::default(),
            hinstance,
            None,
        )
    }?;
    Ok(window)
}

// ── Message loop ──────────────────────────────────────────────────────────────

fn message_loop() -> Result<()> {
    let mut msg = MSG::default();
    loop {
        // SAFETY: &mut msg is valid; a null HWND retrieves messages for every
        // window on this thread.
        let ret = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
        match ret.0 {
            -1 => return Err(last_error("GetMessageW")),
            0 => break,
            _ => unsafe {
                // SAFETY: msg was populated by a successful GetMessageW call.
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            },
        }
    }
    Ok(())
}

// ── Window procedure ──────────────────────────────────────────────────────────

// SAFETY: registered as lpfnWndProc.  Windows guarantees the arguments are
// valid for the duration of the call; `hwnd` is not stored beyond it.
unsafe extern "system" fn wnd_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    match msg {
        WM_SIZE => {
            let width = (lparam.0 & 0xFFFF) as i32;
            let height = ((lparam.0 >> 16) & 0xFFFF) as i32;
            if let Some(browser) = browser() {
                browser.set_bounds(Rect::new(0, 0, width, height));
            }
            LRESULT(0)
        }

        WM_SETFOCUS => {
            if let Some(browser) = browser() {
                browser.on_set_focus();
            }
            DefWindowProcW(hwnd, msg, wparam, lparam)
        }

        WM_PARENTNOTIFY => match browser() {
            Some(browser) if browser.on_parent_notify(wparam.0, lparam.0) => LRESULT(0),
            _ => DefWindowProcW(hwnd, msg, wparam, lparam),
        },

        WM_RUN_TASKS => {
            if let Some(tasks) = tasks() {
                tasks.run_pending();
            }
            LRESULT(0)
        }

        WM_CLOSE => {
            let _ = DestroyWindow(hwnd);
            LRESULT(0)
        }

        WM_DESTROY => {
            // Tear the browser down while its parent window still exists.
            let demo = DEMO.with(|demo| demo.borrow_mut().take());
            if let Some(demo) = demo {
                demo.browser.close();
            }
            PostQuitMessage(0);
            LRESULT(0)
        }

        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}
