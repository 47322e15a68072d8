use rand::seq::SliceRandom;

use super::prelude::*;

const LENNYS: &[&str] = &[
    "( ͡° ͜ʖ ͡°)",
    "( ͠° ͟ʖ ͡°)",
    "( ͡ʘ ͜ʖ ͡ʘ)",
    "(° ͜ʖ °)",
    "ಠ_ಠ",
    "( ͡°( ͡° ͜ʖ( ͡° ͜ʖ ͡°)ʖ ͡°) ͡°)",
    "༼  ͡° ͜ʖ ͡° ༽",
    "(͡ ͡° ͜ つ ͡͡°)",
    "[̲̅$̲̅(̲̅ ͡° ͜ʖ ͡°̲̅)̲̅$̲̅]",
    "( ͡o ͜ʖ ͡o)",
    "(⟃ ͜ʖ ⟄)",
    "( ͜。 ͡ʖ ͜。)",
    "( ͡°⊖ ͡°)",
    "✧･ﾟ: *✧･ﾟ♡*( ͡˘̴ ͜ ʖ̫ ͡˘̴ )*♡･ﾟ✧*:･ﾟ✧",
    "°。°。°。°( ͡° ͜ʖ ͡ °)°。°。°。°",
    "┐( ͡ಠ ʖ̯ ͡ಠ)┌",
    "ʕ ͡° ʖ̯ ͡°ʔ",
    "╭∩╮( ͡° ل͟ ͡° )╭∩╮",
    "(▀̿Ĺ̯▀̿ ̿)",
    "( ͡~ ͜ʖ ͡°)",
    "✺◟( ͡° ͜ʖ ͡°)◞✺",
];

/// Replies with a random Lenny face.
pub struct Lenny;

#[async_trait]
impl Plugin for Lenny {
    fn name() -> Name {
        Name::from("lenny")
    }

    fn author() -> Author {
        Author::from("Mikkel Kroman <mk@maero.dk>")
    }

    fn version() -> Version {
        Version::from("0.1")
    }

    fn requires_config() -> bool {
        false
    }

    fn new(_config: PluginConfig, _services: &Services) -> Result<Lenny, CogwheelError> {
        Ok(Lenny)
    }

    fn command_handler(self: Arc<Self>) -> Option<Arc<dyn CommandHandler>> {
        Some(self)
    }
}

#[async_trait]
impl CommandHandler for Lenny {
    fn commands(&self) -> &[&'static str] {
        &["len", "lenny"]
    }

    async fn handle_command(
        &self,
        ctx: &Context,
        _invocation: Invocation<'_>,
    ) -> Result<(), CommandError> {
        let lenny = LENNYS.choose(&mut rand::thread_rng()).unwrap_or(&LENNYS[0]);

        ctx.reply(lenny)?;

        Ok(())
    }
}
