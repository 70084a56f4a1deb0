//! Event dispatch.
//!
//! One entry point per event kind — free text and button presses — each
//! scoped to one identity. Replies are transport-neutral effects; the
//! engine never talks to a chat platform directly.
//!
//! Concurrency: session locks are only held for synchronous mutation, never
//! across an await. The generate pipeline snapshots the source and the
//! chosen order under the lock, marks the session in flight, and fetches
//! outside it, so concurrent toggles cannot change a run that has already
//! started and a duplicate generate press is rejected instead of
//! interleaved.

use std::sync::RwLock;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use routemix_core::{
    canonical_folder, filter_banners, group_by_region, is_banner, parse_node_line, synthesize,
    to_yaml, ConfigError, ParseError,
};
use routemix_storage::{GroupStore, StorageError};

use crate::event::Action;
use crate::fetch::{looks_like_snippet_link, Fetch, FetchError};
use crate::session::{ChatId, EditSession, SelectionSession, SessionStore, DEFAULT_SESSION_TTL};
use crate::view::{self, Keyboard};

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Idle lifetime before a selection session is reaped.
    pub session_ttl: Duration,
    /// Filename of the generated document attachment.
    pub document_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            document_name: "clash.yaml".to_string(),
        }
    }
}

/// A transport-neutral effect answered to one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A full message, optionally carrying a keyboard.
    Message {
        text: String,
        keyboard: Option<Keyboard>,
    },
    /// Replace the keyboard of the last keyboard-carrying message; `None`
    /// removes it.
    UpdateKeyboard(Option<Keyboard>),
    /// Lightweight inline notice that leaves no message in the history.
    Notice(String),
    /// A named file attachment.
    Document {
        filename: String,
        content: String,
        caption: String,
    },
}

impl Reply {
    fn message(text: impl Into<String>) -> Self {
        Reply::Message {
            text: text.into(),
            keyboard: None,
        }
    }
}

/// Why a generate request was refused or failed.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// No pending subscription source on the session.
    #[error("no subscription source on file")]
    NoSource,

    /// The chosen rule-set list is empty.
    #[error("no rule sets chosen")]
    EmptySelection,

    /// Another generate run is in flight for the same session.
    #[error("a generate run is already in flight")]
    InFlight,

    /// Subscription fetch failed (retriable; session state is preserved).
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A subscription line failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Document assembly failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The interaction engine: sessions, catalog, group store, fetchers.
pub struct Engine<F> {
    sessions: SessionStore,
    groups: GroupStore,
    catalog: RwLock<Vec<String>>,
    fetcher: F,
    config: EngineConfig,
}

impl<F: Fetch> Engine<F> {
    /// Creates an engine with an empty catalog; call
    /// [`Engine::load_catalog`] to populate it.
    pub fn new(fetcher: F, groups: GroupStore, config: EngineConfig) -> Self {
        Self {
            sessions: SessionStore::new(),
            groups,
            catalog: RwLock::new(Vec::new()),
            fetcher,
            config,
        }
    }

    /// Loads the rule-set catalog.
    ///
    /// A failure is non-fatal: the engine keeps an empty catalog and stays
    /// usable, it just has nothing to offer for selection.
    pub async fn load_catalog(&self) {
        match self.fetcher.fetch_catalog().await {
            Ok(names) => {
                let catalog: Vec<String> = names
                    .iter()
                    .map(|name| canonical_folder(name).to_string())
                    .collect();
                info!(entries = catalog.len(), "rule-set catalog loaded");
                *self.catalog.write().unwrap() = catalog;
            }
            Err(err) => {
                warn!(error = %err, "failed to load rule-set catalog, starting empty");
            }
        }
    }

    /// Returns the current catalog snapshot.
    pub fn catalog(&self) -> Vec<String> {
        self.catalog.read().unwrap().clone()
    }

    /// Access to the shared group store.
    pub fn groups(&self) -> &GroupStore {
        &self.groups
    }

    /// Sweeps selection sessions idle past the configured TTL.
    pub fn evict_idle_sessions(&self) -> usize {
        self.sessions.evict_idle(self.config.session_ttl)
    }

    // ==================== Text Events ====================

    /// Handles one free-text message from `id`.
    pub async fn handle_text(&self, id: ChatId, text: &str) -> Vec<Reply> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if text.starts_with('/') {
            return self.handle_command(id, text);
        }

        // Pending search input binds tighter than link recognition; an edit
        // session's search request comes first, as the edit view asked last.
        if let Some(reply) = self.consume_edit_search(id, text) {
            return vec![reply];
        }
        if let Some(reply) = self.consume_selection_search(id, text) {
            return vec![reply];
        }

        if !looks_like_snippet_link(text) {
            return vec![Reply::message("这看起来不是 Gist 链接，请重新发送。")];
        }

        let catalog = self.catalog();
        let group_names = self.groups.names();
        let keyboard = self.sessions.with_selection(id, |session| {
            session.set_source(text);
            view::selection_keyboard(session, &catalog, &group_names)
        });
        vec![Reply::Message {
            text: "好的！请选择要启用的分流规则（可多选）：".to_string(),
            keyboard: Some(keyboard),
        }]
    }

    fn consume_edit_search(&self, id: ChatId, text: &str) -> Option<Reply> {
        let catalog = self.catalog();
        self.sessions
            .with_edit(id, |session| {
                if !session.awaiting_search {
                    return None;
                }
                session.set_search(text);
                Some(Reply::Message {
                    text: format!("已根据关键词“{text}”过滤："),
                    keyboard: Some(view::edit_keyboard(session, &catalog)),
                })
            })
            .flatten()
    }

    fn consume_selection_search(&self, id: ChatId, text: &str) -> Option<Reply> {
        let catalog = self.catalog();
        let group_names = self.groups.names();
        self.sessions.with_selection(id, |session| {
            if !session.awaiting_search {
                return None;
            }
            session.set_search(text);
            Some(Reply::Message {
                text: format!("已根据关键词“{text}”过滤："),
                keyboard: Some(view::selection_keyboard(session, &catalog, &group_names)),
            })
        })
    }

    // ==================== Commands ====================

    fn handle_command(&self, id: ChatId, text: &str) -> Vec<Reply> {
        let mut parts = text.split_whitespace();
        let command = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();
        match command {
            "/start" => vec![Reply::message(
                "发送包含节点信息的 Gist 原始链接，然后点击按钮选择需要的分流规则。",
            )],
            "/help" => vec![Reply::message(
                [
                    "可用指令:",
                    "/groups - 查看所有分组",
                    "/newgroup <名称> [规则...] - 创建分组",
                    "/addrules <名称> <规则...> - 向分组添加规则",
                    "/removerules <名称> <规则...> - 从分组移除规则",
                    "/editgroup <名称> - 使用按钮编辑分组",
                ]
                .join("\n"),
            )],
            "/groups" => self.cmd_groups(),
            "/newgroup" => self.cmd_new_group(&args),
            "/addrules" => self.cmd_add_rules(&args),
            "/removerules" => self.cmd_remove_rules(&args),
            "/editgroup" => self.cmd_edit_group(id, &args),
            _ => vec![Reply::message("未知指令，发送 /help 查看可用指令。")],
        }
    }

    fn cmd_groups(&self) -> Vec<Reply> {
        let groups = self.groups.snapshot();
        if groups.is_empty() {
            return vec![Reply::message("当前没有自定义分组")];
        }
        let lines: Vec<String> = groups
            .iter()
            .map(|(name, members)| {
                if members.is_empty() {
                    format!("{name}: 无规则")
                } else {
                    format!("{name}: {}", members.join(", "))
                }
            })
            .collect();
        vec![Reply::message(lines.join("\n"))]
    }

    fn cmd_new_group(&self, args: &[&str]) -> Vec<Reply> {
        let Some((name, rules)) = args.split_first() else {
            return vec![Reply::message("用法: /newgroup 组名 [规则...]")];
        };
        let rules: Vec<String> = rules.iter().map(|s| s.to_string()).collect();
        match self.groups.create(name, rules) {
            Ok(()) => vec![Reply::message(format!("已创建分组 {name}"))],
            Err(StorageError::GroupExists(_)) => vec![Reply::message("该分组已存在")],
            Err(err) => persist_failure(err),
        }
    }

    fn cmd_add_rules(&self, args: &[&str]) -> Vec<Reply> {
        if args.len() < 2 {
            return vec![Reply::message("用法: /addrules 组名 规则...")];
        }
        let name = args[0];
        let rules: Vec<String> = args[1..].iter().map(|s| s.to_string()).collect();
        match self.groups.add_rules(name, &rules) {
            Ok(()) => vec![Reply::message(format!("已更新分组 {name}"))],
            Err(err) => persist_failure(err),
        }
    }

    fn cmd_remove_rules(&self, args: &[&str]) -> Vec<Reply> {
        if args.len() < 2 {
            return vec![Reply::message("用法: /removerules 组名 规则...")];
        }
        let name = args[0];
        let rules: Vec<String> = args[1..].iter().map(|s| s.to_string()).collect();
        match self.groups.remove_rules(name, &rules) {
            Ok(()) => vec![Reply::message(format!("已更新分组 {name}"))],
            Err(StorageError::GroupNotFound(_)) => vec![Reply::message("分组不存在")],
            Err(err) => persist_failure(err),
        }
    }

    fn cmd_edit_group(&self, id: ChatId, args: &[&str]) -> Vec<Reply> {
        let Some(name) = args.first() else {
            return vec![Reply::message("用法: /editgroup 组名")];
        };
        // Editing a group that does not exist yet is allowed; saving will
        // create it.
        let members = self.groups.members(name).unwrap_or_default();
        let session = EditSession::new(*name, &members);
        let catalog = self.catalog();
        let keyboard = view::edit_keyboard(&session, &catalog);
        self.sessions.begin_edit(id, session);
        vec![Reply::Message {
            text: format!("正在编辑分组 {name}，勾选要包含的规则："),
            keyboard: Some(keyboard),
        }]
    }

    // ==================== Button Events ====================

    /// Handles one button press from `id`.
    pub async fn handle_action(&self, id: ChatId, token: &str) -> Vec<Reply> {
        let Some(action) = Action::parse(token) else {
            debug!(token, "ignoring unknown action token");
            return Vec::new();
        };
        match action {
            Action::Toggle(name) => self.refresh_selection(id, |session, _| {
                session.toggle(&name);
                true
            }),
            Action::ToggleGroup(name) => {
                let members = self.groups.members(&name).unwrap_or_default();
                self.refresh_selection(id, move |session, _| {
                    session.toggle_group(&members);
                    true
                })
            }
            Action::NextPage => self.refresh_selection(id, |session, len| session.next_page(len)),
            Action::PrevPage => self.refresh_selection(id, |session, _| session.prev_page()),
            Action::NextGroupPage => {
                let count = self.groups.len();
                self.refresh_selection(id, move |session, _| session.next_group_page(count))
            }
            Action::PrevGroupPage => {
                self.refresh_selection(id, |session, _| session.prev_group_page())
            }
            Action::Letter(letter) => self.refresh_selection(id, |session, _| {
                session.set_letter(letter);
                true
            }),
            Action::Search => {
                self.sessions
                    .with_selection(id, |session| session.awaiting_search = true);
                vec![Reply::Notice("请输入关键词发送给我".to_string())]
            }
            Action::ClearFilter => self.refresh_selection(id, |session, _| session.clear_filter()),
            Action::Generate => self.generate(id).await,
            Action::EditToggle(name) => self.refresh_edit(id, |session, _| {
                session.toggle(&name);
                true
            }),
            Action::EditNextPage => self.refresh_edit(id, |session, len| session.next_page(len)),
            Action::EditPrevPage => self.refresh_edit(id, |session, _| session.prev_page()),
            Action::EditSearch => match self
                .sessions
                .with_edit(id, |session| session.awaiting_search = true)
            {
                Some(()) => vec![Reply::Notice("请输入关键词发送给我".to_string())],
                None => Vec::new(),
            },
            Action::EditClearFilter => self.refresh_edit(id, |session, _| session.clear_filter()),
            Action::EditSave => self.edit_save(id),
            Action::EditCancel => match self.sessions.take_edit(id) {
                Some(session) => vec![
                    Reply::UpdateKeyboard(None),
                    Reply::message(format!("已取消编辑 {}", session.group)),
                ],
                None => vec![Reply::Notice("没有正在编辑的分组".to_string())],
            },
        }
    }

    /// Applies `mutate` to the selection session and answers with a fresh
    /// keyboard when it reports a change. The second closure argument is
    /// the filtered candidate count, which bounds pagination.
    fn refresh_selection(
        &self,
        id: ChatId,
        mutate: impl FnOnce(&mut SelectionSession, usize) -> bool,
    ) -> Vec<Reply> {
        let catalog = self.catalog();
        let group_names = self.groups.names();
        self.sessions.with_selection(id, |session| {
            let filtered_len = session.filtered(&catalog).len();
            if mutate(session, filtered_len) {
                vec![Reply::UpdateKeyboard(Some(view::selection_keyboard(
                    session,
                    &catalog,
                    &group_names,
                )))]
            } else {
                Vec::new()
            }
        })
    }

    /// Same as [`Engine::refresh_selection`], for the edit session. A press
    /// without an active edit session is a no-op.
    fn refresh_edit(
        &self,
        id: ChatId,
        mutate: impl FnOnce(&mut EditSession, usize) -> bool,
    ) -> Vec<Reply> {
        let catalog = self.catalog();
        self.sessions
            .with_edit(id, |session| {
                let filtered_len = session.filtered(&catalog).len();
                if mutate(session, filtered_len) {
                    vec![Reply::UpdateKeyboard(Some(view::edit_keyboard(
                        session, &catalog,
                    )))]
                } else {
                    Vec::new()
                }
            })
            .unwrap_or_default()
    }

    fn edit_save(&self, id: ChatId) -> Vec<Reply> {
        let Some(session) = self.sessions.take_edit(id) else {
            return vec![Reply::Notice("没有正在编辑的分组".to_string())];
        };
        let members: Vec<String> = session.working.iter().cloned().collect();
        match self.groups.replace(&session.group, members) {
            Ok(()) => vec![
                Reply::UpdateKeyboard(None),
                Reply::message(format!("分组 {} 已保存", session.group)),
            ],
            Err(err) => {
                warn!(error = %err, group = %session.group, "failed to persist group edit");
                let notice = format!("保存分组失败: {err}");
                // Keep the session so the save can be retried.
                self.sessions.begin_edit(id, session);
                vec![Reply::Notice(notice)]
            }
        }
    }

    // ==================== Generate ====================

    async fn generate(&self, id: ChatId) -> Vec<Reply> {
        let (source, chosen) = match self.try_begin_generate(id) {
            Ok(snapshot) => snapshot,
            Err(GenerateError::NoSource) => {
                return vec![Reply::Notice("请先发送 Gist 链接".to_string())]
            }
            Err(GenerateError::EmptySelection) => {
                return vec![Reply::Notice("至少选择一个规则".to_string())]
            }
            Err(_) => return vec![Reply::Notice("正在生成中，请稍候".to_string())],
        };

        info!(rule_sets = chosen.len(), "generating configuration");
        let mut replies = vec![Reply::Notice("开始生成，请稍候…".to_string())];
        match self.run_pipeline(&source, &chosen).await {
            Ok(document) => replies.push(Reply::Document {
                filename: self.config.document_name.clone(),
                content: document,
                caption: "配置生成成功 🎉".to_string(),
            }),
            Err(GenerateError::Fetch(err)) => {
                warn!(error = %err, "subscription fetch failed");
                replies.push(Reply::message(format!("获取 Gist 内容失败: {err}")));
            }
            Err(GenerateError::Parse(err)) => {
                replies.push(Reply::message(format!("解析节点失败: {err}")));
            }
            Err(err) => {
                replies.push(Reply::message(format!("生成配置失败: {err}")));
            }
        }
        self.finish_generate(id);
        replies
    }

    /// Checks the generate preconditions and marks the session in flight,
    /// returning the snapshot the pipeline runs on.
    fn try_begin_generate(&self, id: ChatId) -> Result<(String, Vec<String>), GenerateError> {
        self.sessions.with_selection(id, |session| {
            if session.generating {
                return Err(GenerateError::InFlight);
            }
            let source = session.source.clone().ok_or(GenerateError::NoSource)?;
            if session.chosen.is_empty() {
                return Err(GenerateError::EmptySelection);
            }
            session.generating = true;
            Ok((source, session.chosen.iter().cloned().collect()))
        })
    }

    fn finish_generate(&self, id: ChatId) {
        self.sessions
            .with_selection(id, |session| session.generating = false);
    }

    /// Fetch → parse → filter → group → synthesize, on the snapshot.
    async fn run_pipeline(&self, source: &str, chosen: &[String]) -> Result<String, GenerateError> {
        let raw = self.fetcher.fetch_subscription(source).await?;
        let mut nodes = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            // Banner lines are not guaranteed to be node-shaped, so screen
            // the name field before parsing.
            let name = line.split(',').next().unwrap_or(line);
            if is_banner(name) {
                continue;
            }
            nodes.push(parse_node_line(line)?);
        }
        let nodes = filter_banners(nodes);
        let regions = group_by_region(&nodes);
        let config = synthesize(&nodes, &regions, chosen)?;
        Ok(to_yaml(&config)?)
    }
}

fn persist_failure(err: StorageError) -> Vec<Reply> {
    warn!(error = %err, "failed to persist groups");
    vec![Reply::message(format!("保存分组失败: {err}"))]
}
