//! Bundle runtime
//!
//! Chunk files register module factories in a shared table; entry chunks
//! additionally carry the loader that executes them and fetches async chunks.

use serde::Serialize;
use std::collections::BTreeMap;

/// First statement of every chunk file
pub const PRELUDE: &str =
    "var __sheaf_modules__ = (globalThis.__sheaf_modules__ = globalThis.__sheaf_modules__ || {});";

const LOADER: &str = r#"(function (modules, publicPath, asyncMap, preloaded) {
  var cache = {};
  var installed = {};
  preloaded.forEach(function (file) {
    installed[file] = Promise.resolve();
  });
  function load(key) {
    if (cache[key]) return cache[key].exports;
    var record = modules[key];
    if (!record) throw new Error("Cannot find module '" + key + "'");
    var module = (cache[key] = { exports: {} });
    record[1].call(module.exports, module, module.exports, scoped(record[0]));
    return module.exports;
  }
  function scoped(deps) {
    function lookup(specifier) {
      return Object.prototype.hasOwnProperty.call(deps, specifier) ? deps[specifier] : specifier;
    }
    function require(specifier) {
      return load(lookup(specifier));
    }
    require.dynamic = function (specifier) {
      var key = lookup(specifier);
      var files = asyncMap[key] || [];
      return Promise.all(files.map(loadFile)).then(function () {
        return load(key);
      });
    };
    return require;
  }
  function loadFile(file) {
    if (installed[file]) return installed[file];
    installed[file] = new Promise(function (resolve, reject) {
      var element;
      if (/\.css$/.test(file)) {
        element = document.createElement("link");
        element.rel = "stylesheet";
        element.href = publicPath + file;
      } else {
        element = document.createElement("script");
        element.src = publicPath + file;
      }
      element.onload = resolve;
      element.onerror = function () {
        delete installed[file];
        reject(new Error("Loading chunk file failed: " + file));
      };
      document.head.appendChild(element);
    });
    return installed[file];
  }
  globalThis.__sheaf_require__ = load;
})"#;

fn json<T: Serialize + ?Sized>(value: &T) -> String {
    // Maps and sequences of strings always serialize.
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Registration statement for one module
pub fn render_module(
    key: &str,
    dependencies: &BTreeMap<String, String>,
    body: &str,
    banner: bool,
) -> String {
    let mut out = String::new();
    if banner {
        out.push_str(&format!("/* {} */\n", key.replace("*/", "*\\/")));
    }
    out.push_str(&format!(
        "__sheaf_modules__[{}] = [{}, function (module, exports, require) {{\n",
        json(key),
        json(dependencies)
    ));
    if !body.is_empty() {
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }
    out.push_str("}];\n");
    out
}

/// Loader plus the call that starts `entry`
///
/// `async_map` maps a dynamic import target's module key to the files it
/// needs; `preloaded` lists the files the entry's page already loads.
pub fn render_bootstrap(
    public_path: &str,
    async_map: &BTreeMap<String, Vec<String>>,
    preloaded: &[String],
    entry: &str,
) -> String {
    format!(
        "{}(__sheaf_modules__, {}, {}, {});\n__sheaf_require__({});\n",
        LOADER,
        json(public_path),
        json(async_map),
        json(preloaded),
        json(entry)
    )
}
