/// Browser bootstrap served at `/miniapp.js`.
///
/// Mirrors the greeting renderer on the client: identity values are written
/// with `textContent`, never spliced into markup.
pub fn miniapp_script() -> String {
    r#"// miniapp bootstrap
(function(global) {
  const NO_USERNAME = "no username";

  function greetingView(user) {
    user = user || {};
    const fullName = (user.first_name || "") + (user.last_name || "");
    const handle = user.username ? "@" + user.username : NO_USERNAME;
    return { fullName, handle };
  }

  function el(tag, attrs, children) {
    const node = document.createElement(tag);
    Object.entries(attrs || {}).forEach(([k, v]) => node.setAttribute(k, v));
    (children || []).forEach((c) => node.append(c));
    return node;
  }

  function setupCounter(button) {
    let counter = Number(button.dataset.count || 0);
    const set = (n) => {
      counter = n;
      button.dataset.count = String(n);
      button.textContent = "count is " + n;
    };
    button.addEventListener("click", () => set(counter + 1));
    set(counter);
  }

  function init() {
    const webApp = global.Telegram && global.Telegram.WebApp;
    if (!webApp) {
      throw new Error("miniapp: Telegram.WebApp is not available");
    }
    webApp.ready();

    const opened = fetch("/api/open?" + webApp.initData);

    const view = greetingView(webApp.initDataUnsafe && webApp.initDataUnsafe.user);
    const app = document.getElementById("app");
    if (!app) {
      throw new Error("miniapp: #app not found");
    }
    if (!document.getElementById("counter")) {
      const name = el("span", { "data-field": "full-name" });
      name.textContent = view.fullName;
      const handle = el("p", { class: "handle", "data-field": "handle" });
      handle.textContent = view.handle;
      const button = el("button", { id: "counter", type: "button" });
      app.replaceChildren(
        el("div", { class: "greeting" }, [
          el("h1", {}, ["Hello, ", name]),
          handle,
          el("div", { class: "card" }, [button]),
        ])
      );
    }
    setupCounter(document.getElementById("counter"));
    return opened;
  }

  global.MiniApp = { init, greetingView };
  if (document.readyState === "loading") {
    document.addEventListener("DOMContentLoaded", init);
  } else {
    init();
  }
})(window);
"#
    .to_string()
}

/// Page used when the static root has no `index.html`.
pub fn default_shell_html() -> String {
    r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Mini App</title>
    <script src="https://telegram.org/js/telegram-web-app.js"></script>
  </head>
  <body>
    <div id="app"></div>
    <script src="/miniapp.js"></script>
  </body>
</html>
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::greeting::APP_ELEMENT_ID;
    use crate::page::Page;

    #[test]
    fn shell_has_app_container() {
        let page = Page::parse(&default_shell_html());
        assert!(page.element_by_id(APP_ELEMENT_ID).is_ok());
    }

    #[test]
    fn script_uses_text_content_for_identity() {
        let script = miniapp_script();
        assert!(script.contains("\"/api/open?\" + webApp.initData"));
        assert!(script.contains("textContent = view.fullName"));
        assert!(!script.contains("innerHTML"));
    }
}
